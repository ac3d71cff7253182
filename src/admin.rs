/// Back-office tables behind a login.
///
/// There is no ambient "logged in" flag: holding an [`AdminSession`] is the
/// proof of login, table fetches borrow it, and `logout` consumes it.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::AuthError;
use crate::state::ScoreBand;
use crate::ui::{band_label, fmt_inr};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

// ── Login ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AdminGate {
    username: String,
    password: String,
}

impl Default for AdminGate {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
    }
}

impl AdminGate {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AdminSession, AuthError> {
        if username.trim() != self.username || password != self.password {
            info!(component = "admin", event = "login.rejected", username = %username.trim());
            return Err(AuthError::InvalidCredentials);
        }
        info!(component = "admin", event = "login.accepted", username = %self.username);
        Ok(AdminSession { username: self.username.clone(), since: Utc::now() })
    }

    /// Shown under the login form.
    pub fn hint(&self) -> String {
        format!("Invalid credentials. Use {}/{}", self.username, self.password)
    }
}

/// Proof of a successful admin login. Deliberately not `Clone`.
#[derive(Debug)]
pub struct AdminSession {
    username: String,
    since: DateTime<Utc>,
}

impl AdminSession {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn since(&self) -> DateTime<Utc> {
        self.since
    }

    pub fn logout(self) {
        info!(component = "admin", event = "logout", username = %self.username);
    }
}

// ── Tables ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminTable {
    Customers,
    Offers,
    Kyc,
    Credit,
}

impl AdminTable {
    pub const ALL: [AdminTable; 4] = [AdminTable::Customers, AdminTable::Offers, AdminTable::Kyc, AdminTable::Credit];

    /// Last segment of `/api/admin/{path}`.
    pub fn path(self) -> &'static str {
        match self {
            AdminTable::Customers => "customers",
            AdminTable::Offers => "offers",
            AdminTable::Kyc => "kyc",
            AdminTable::Credit => "credit",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AdminTable::Customers => "Customer Database",
            AdminTable::Offers => "Offer Mart",
            AdminTable::Kyc => "CRM Server",
            AdminTable::Credit => "Credit Bureau",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AdminTable::Customers => "Synthetic customer data",
            AdminTable::Offers => "Pre-approved loan offers",
            AdminTable::Kyc => "Customer KYC data",
            AdminTable::Credit => "Credit scores & history",
        }
    }

    pub fn headers(self) -> &'static [&'static str] {
        match self {
            AdminTable::Customers => &["ID", "Customer Name", "Age", "City", "Credit Score", "Pre-approved Limit"],
            AdminTable::Offers => &["Customer ID", "Offer Amount", "Interest Rate", "Tenure Options", "Processing Fee", "Status"],
            AdminTable::Kyc => &["Customer ID", "Name", "PAN", "Aadhar", "Phone Verified", "KYC Status"],
            AdminTable::Credit => &["Customer ID", "Credit Score", "Score Range", "Total Accounts", "Active Loans", "Payment History"],
        }
    }

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let i = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(i + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomerRecord {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub city: String,
    pub credit_score: Option<u32>,
    pub pre_approved_limit: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OfferRecord {
    pub customer_id: String,
    pub amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub tenure_options: Vec<u32>,
    pub processing_fee: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KycRecord {
    pub customer_id: String,
    pub name: String,
    pub pan_number: String,
    pub aadhar_number: String,
    pub phone_verified: bool,
    pub kyc_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CreditRecord {
    pub customer_id: String,
    pub credit_score: Option<u32>,
    pub score_range: String,
    pub total_accounts: Option<u32>,
    pub active_accounts: Option<u32>,
    pub payment_history: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminRows {
    Customers(Vec<CustomerRecord>),
    Offers(Vec<OfferRecord>),
    Kyc(Vec<KycRecord>),
    Credit(Vec<CreditRecord>),
}

fn or_na<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn score(v: Option<u32>) -> String {
    match v {
        Some(s) => format!("{s} ({})", band_label(ScoreBand::from_score(s))),
        None => "N/A".to_string(),
    }
}

impl AdminRows {
    pub fn decode(table: AdminTable, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match table {
            AdminTable::Customers => AdminRows::Customers(serde_json::from_slice(body)?),
            AdminTable::Offers => AdminRows::Offers(serde_json::from_slice(body)?),
            AdminTable::Kyc => AdminRows::Kyc(serde_json::from_slice(body)?),
            AdminTable::Credit => AdminRows::Credit(serde_json::from_slice(body)?),
        })
    }

    /// Empty rows for a table, shown when a fetch fails.
    pub fn empty(table: AdminTable) -> Self {
        match table {
            AdminTable::Customers => AdminRows::Customers(Vec::new()),
            AdminTable::Offers => AdminRows::Offers(Vec::new()),
            AdminTable::Kyc => AdminRows::Kyc(Vec::new()),
            AdminTable::Credit => AdminRows::Credit(Vec::new()),
        }
    }

    pub fn table(&self) -> AdminTable {
        match self {
            AdminRows::Customers(_) => AdminTable::Customers,
            AdminRows::Offers(_) => AdminTable::Offers,
            AdminRows::Kyc(_) => AdminTable::Kyc,
            AdminRows::Credit(_) => AdminTable::Credit,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AdminRows::Customers(r) => r.len(),
            AdminRows::Offers(r) => r.len(),
            AdminRows::Kyc(r) => r.len(),
            AdminRows::Credit(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display cells, one `Vec` per row, aligned with `table().headers()`.
    pub fn rows(&self) -> Vec<Vec<String>> {
        match self {
            AdminRows::Customers(rows) => rows
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        or_na(c.age),
                        c.city.clone(),
                        score(c.credit_score),
                        c.pre_approved_limit.map(fmt_inr).unwrap_or_else(|| "N/A".into()),
                    ]
                })
                .collect(),
            AdminRows::Offers(rows) => rows
                .iter()
                .map(|o| {
                    let tenures: Vec<String> = o.tenure_options.iter().map(|t| t.to_string()).collect();
                    vec![
                        o.customer_id.clone(),
                        o.amount.map(fmt_inr).unwrap_or_else(|| "N/A".into()),
                        o.interest_rate.map(|r| format!("{r}%")).unwrap_or_else(|| "N/A".into()),
                        tenures.join(", "),
                        o.processing_fee.map(fmt_inr).unwrap_or_else(|| "N/A".into()),
                        "Active".to_string(),
                    ]
                })
                .collect(),
            AdminRows::Kyc(rows) => rows
                .iter()
                .map(|k| {
                    vec![
                        k.customer_id.clone(),
                        k.name.clone(),
                        k.pan_number.clone(),
                        k.aadhar_number.clone(),
                        if k.phone_verified { "✓ Verified" } else { "✗ Not Verified" }.to_string(),
                        k.kyc_status.clone(),
                    ]
                })
                .collect(),
            AdminRows::Credit(rows) => rows
                .iter()
                .map(|c| {
                    vec![
                        c.customer_id.clone(),
                        score(c.credit_score),
                        c.score_range.clone(),
                        or_na(c.total_accounts),
                        or_na(c.active_accounts),
                        c.payment_history.clone(),
                    ]
                })
                .collect(),
        }
    }
}
