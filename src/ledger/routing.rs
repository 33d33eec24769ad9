//! Destination routing for uploaded attachments
//!
//! Maps an expense-type token to the storage folder it belongs in. Folder
//! ids are configured per deployment and may be partially unset, so the
//! resolver degrades through an ordered fallback chain instead of failing
//! an upload over a missing mapping.

use std::env;

/// Resolved upload destination for one attachment.
///
/// `folder_id == None` means "unrouted": the caller uploads without a parent
/// folder and logs a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRoute {
    pub folder_id: Option<String>,
    pub category: String,
}

impl DestinationRoute {
    pub fn is_routed(&self) -> bool {
        self.folder_id.is_some()
    }
}

/// Classified expense-type token. Resolution rules are ordered over this
/// enum rather than string checks scattered across call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CategoryKind {
    /// Reserved literal for sale-invoice PDF documents
    InvoiceDocument,
    /// "Supplier: Other" purchases without a known supplier
    SupplierOther,
    Purchasing,
    /// "Other" / "Other Bill" / "Other Expense" family, including the
    /// "Other Bill: <description>" prefix form
    OtherFamily,
    /// A category with a canonical folder key ("electricity", "water", ...)
    Named(&'static str),
    Unknown,
}

/// Category table: expense-type token (lowercased) to canonical folder key.
/// Bare canonical keys are accepted as well as the spelled-out bill names.
const CATEGORY_TABLE: &[(&str, &str)] = &[
    ("electricity bill", "electricity"),
    ("electricity", "electricity"),
    ("water bill", "water"),
    ("water", "water"),
    ("wifi bill", "wifi"),
    ("wifi", "wifi"),
    ("worker salary", "salary"),
    ("salary", "salary"),
];

fn classify(raw: &str) -> CategoryKind {
    let token = raw.trim().to_lowercase();

    if token == "invoice_pdf" {
        return CategoryKind::InvoiceDocument;
    }
    if token == "supplier_other" || token == "supplier: other" {
        return CategoryKind::SupplierOther;
    }
    if token == "purchasing" {
        return CategoryKind::Purchasing;
    }
    if token == "other"
        || token == "billing"
        || token.starts_with("other bill")
        || token.starts_with("other expense")
    {
        return CategoryKind::OtherFamily;
    }
    for (name, canonical) in CATEGORY_TABLE {
        if token == *name {
            return CategoryKind::Named(canonical);
        }
    }
    CategoryKind::Unknown
}

/// Per-deployment destination folder ids.
///
/// Constructor-injected wherever routing happens so tests can exercise
/// partially-configured deployments without touching process environment.
#[derive(Debug, Clone, Default)]
pub struct FolderConfig {
    pub invoice_pdf: Option<String>,
    pub supplier_other: Option<String>,
    pub purchasing: Option<String>,
    pub other: Option<String>,
    pub electricity: Option<String>,
    pub water: Option<String>,
    pub wifi: Option<String>,
    /// Secondary lookup key for WiFi receipts; some deployments configure
    /// the folder under the internet name instead.
    pub internet: Option<String>,
    pub salary: Option<String>,
    /// Process-wide default used when a mapping is unset
    pub default: Option<String>,
}

fn env_folder(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl FolderConfig {
    /// Reads folder ids from the environment
    pub fn from_env() -> Self {
        Self {
            invoice_pdf: env_folder("DRIVE_FOLDER_INVOICE_PDF"),
            supplier_other: env_folder("DRIVE_FOLDER_SUPPLIER_OTHER"),
            purchasing: env_folder("DRIVE_FOLDER_PURCHASING"),
            other: env_folder("DRIVE_FOLDER_OTHER"),
            electricity: env_folder("DRIVE_FOLDER_ELECTRICITY"),
            water: env_folder("DRIVE_FOLDER_WATER"),
            wifi: env_folder("DRIVE_FOLDER_WIFI"),
            internet: env_folder("DRIVE_FOLDER_INTERNET"),
            salary: env_folder("DRIVE_FOLDER_SALARY"),
            default: env_folder("GOOGLE_DRIVE_FOLDER_ID"),
        }
    }

    /// Resolves an expense-type token to its upload destination.
    ///
    /// Pure and total: always returns a route, never fails. Rules are
    /// ordered, first match wins, comparisons case-insensitive:
    ///
    /// 1. the invoice-document literal uses its dedicated folder,
    ///    independent of the category table
    /// 2. supplier-other uses its own folder, falling back to purchasing
    /// 3. purchasing uses the purchasing folder
    /// 4. the "other" family collapses onto the other folder
    /// 5. known categories use their mapped folder (WiFi also checks the
    ///    internet key)
    /// 6. anything still unresolved uses the default folder, or goes
    ///    unrouted when no default is configured
    pub fn resolve(&self, raw: &str) -> DestinationRoute {
        let (folder, category) = match classify(raw) {
            CategoryKind::InvoiceDocument => (self.invoice_pdf.clone(), "invoice_pdf"),
            CategoryKind::SupplierOther => (
                self.supplier_other.clone().or_else(|| self.purchasing.clone()),
                "supplier_other",
            ),
            CategoryKind::Purchasing => (self.purchasing.clone(), "purchasing"),
            CategoryKind::OtherFamily => (self.other.clone(), "other"),
            CategoryKind::Named(canonical) => {
                let folder = match canonical {
                    "electricity" => self.electricity.clone(),
                    "water" => self.water.clone(),
                    "wifi" => self.wifi.clone().or_else(|| self.internet.clone()),
                    "salary" => self.salary.clone(),
                    _ => None,
                };
                (folder, canonical)
            }
            CategoryKind::Unknown => (None, ""),
        };

        let category = if category.is_empty() {
            raw.trim().to_lowercase()
        } else {
            category.to_string()
        };

        DestinationRoute {
            folder_id: folder.or_else(|| self.default.clone()),
            category,
        }
    }

    /// Default folder id, if configured
    pub fn default_folder(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// (configured, total) counts over the category mappings, for the
    /// startup diagnostics banner
    pub fn configured_count(&self) -> (usize, usize) {
        let mappings = [
            &self.invoice_pdf,
            &self.supplier_other,
            &self.purchasing,
            &self.other,
            &self.electricity,
            &self.water,
            &self.wifi,
            &self.internet,
            &self.salary,
        ];
        let configured = mappings.iter().filter(|m| m.is_some()).count();
        (configured, mappings.len())
    }
}
