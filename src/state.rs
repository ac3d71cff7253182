/// Server-held application state, as mirrored by the client.
///
/// The backend serialises its session state as a loose JSON object. Every field
/// the front-end reads is spelled out here; everything else is ignored.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Application status ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationStatus {
    #[default]
    NotStarted,
    InProgress,
    Approved,
    Rejected,
    SanctionGenerated,
    Other(String),
}

impl From<String> for ApplicationStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "NOT_STARTED" => ApplicationStatus::NotStarted,
            "IN_PROGRESS" => ApplicationStatus::InProgress,
            "APPROVED" => ApplicationStatus::Approved,
            "REJECTED" => ApplicationStatus::Rejected,
            "SANCTION_GENERATED" => ApplicationStatus::SanctionGenerated,
            _ => ApplicationStatus::Other(raw),
        }
    }
}

impl From<ApplicationStatus> for String {
    fn from(status: ApplicationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ApplicationStatus::NotStarted => "NOT_STARTED",
            ApplicationStatus::InProgress => "IN_PROGRESS",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::SanctionGenerated => "SANCTION_GENERATED",
            ApplicationStatus::Other(s) => s.as_str(),
        }
    }
}

// ── Nested records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub application_id: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub loan_amount: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub tenure_months: u32,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub application_date: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionLetter {
    pub sanction_reference: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub loan_amount: f64,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub interest_rate: f64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub tenure_months: u32,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub emi_amount: f64,
    #[serde(default)]
    pub generated_date: String,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// One full snapshot of the backend's session state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationState {
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_city: Option<String>,
    #[serde(default, deserialize_with = "lenient_whole")]
    pub customer_salary: Option<u64>,
    pub customer_occupation: Option<String>,
    pub customer_employer: Option<String>,
    pub customer_pan: Option<String>,
    pub customer_bank: Option<String>,
    pub customer_account: Option<String>,

    #[serde(default, deserialize_with = "lenient_whole")]
    pub pre_approved_limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient_whole")]
    pub credit_score: Option<u32>,

    #[serde(default)]
    pub application_status: ApplicationStatus,
    #[serde(default)]
    pub application_initiated: bool,
    #[serde(default)]
    pub kyc_verified: bool,
    #[serde(default)]
    pub loan_approved: bool,
    #[serde(default)]
    pub offer_shown: bool,

    /// The backend sends `{}` until an application exists.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub loan_application: Option<LoanApplication>,
    /// The backend sends `{}` until a letter has been generated.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub sanction_letter: Option<SanctionLetter>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom),
    }
}

// ── Lenient numbers ───────────────────────────────────────────────────────────
//
// Parts of the state are filled from model tool calls, so a count may arrive as
// `36`, `36.0` or `"36"`. Anything that is not a usable number decodes as absent
// rather than failing the whole snapshot.

fn as_number(value: &Value) -> Option<f64> {
    let n: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn whole<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    if let Some(n) = value.as_u64() {
        return T::try_from(n).ok();
    }
    let n = as_number(value)?;
    if n < 0.0 || n.fract() != 0.0 || n > u64::MAX as f64 {
        return None;
    }
    T::try_from(n as u64).ok()
}

fn lenient_whole<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.as_ref().and_then(whole::<T>))
}

fn lenient_count<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64> + Default,
{
    Ok(lenient_whole(deserializer)?.unwrap_or_default())
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.as_ref().and_then(as_number).unwrap_or_default())
}

// ── Progress steps (status panel) ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    Pending,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStep {
    pub label: &'static str,
    pub status: StepStatus,
    pub detail: Option<String>,
}

impl ApplicationState {
    pub fn sanction_reference(&self) -> Option<&str> {
        self.sanction_letter
            .as_ref()
            .map(|l| l.sanction_reference.as_str())
            .filter(|r| !r.is_empty())
    }

    /// The four milestones shown beside the chat, in display order.
    pub fn progress(&self) -> [ProgressStep; 4] {
        let done = |b: bool| if b { StepStatus::Completed } else { StepStatus::Pending };
        let approval = match self.application_status {
            ApplicationStatus::Approved | ApplicationStatus::SanctionGenerated => StepStatus::Completed,
            ApplicationStatus::Rejected => StepStatus::Error,
            _ => StepStatus::Pending,
        };
        [
            ProgressStep { label: "KYC Verification", status: done(self.kyc_verified), detail: None },
            ProgressStep {
                label: "Credit Check",
                status: done(self.credit_score.is_some()),
                detail: self.credit_score.map(|s| format!("Score: {s}")),
            },
            ProgressStep { label: "Loan Approval", status: approval, detail: None },
            ProgressStep {
                label: "Sanction Letter",
                status: done(self.sanction_reference().is_some()),
                detail: None,
            },
        ]
    }
}

// ── Credit score bands ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            750.. => ScoreBand::Good,
            700..=749 => ScoreBand::Fair,
            _ => ScoreBand::Poor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL_STATE: &str = r#"{
        "customer_id": "C1001",
        "customer_name": "Rajesh Kumar",
        "customer_phone": "+91-9876543210",
        "customer_city": "Mumbai",
        "customer_salary": 85000,
        "pre_approved_limit": 500000,
        "credit_score": 780,
        "current_offer": {"amount": 500000, "interest_rate": 10.5},
        "loan_application": {},
        "application_status": "NOT_STARTED",
        "application_initiated": false,
        "kyc_verified": false,
        "kyc_data": {},
        "eligibility_evaluation": {},
        "loan_approved": false,
        "sanction_letter": {},
        "interaction_history": [],
        "offer_shown": false
    }"#;

    #[test]
    fn test_initial_backend_state_decodes_with_empty_records_as_none() {
        let state: ApplicationState = serde_json::from_str(INITIAL_STATE).unwrap();
        assert_eq!(state.customer_id, "C1001");
        assert_eq!(state.credit_score, Some(780));
        assert_eq!(state.application_status, ApplicationStatus::NotStarted);
        assert!(state.loan_application.is_none());
        assert!(state.sanction_letter.is_none());
        assert_eq!(state.sanction_reference(), None);
    }

    #[test]
    fn test_sanction_letter_decodes_when_present() {
        let raw = r#"{
            "customer_name": "Rajesh Kumar",
            "application_status": "SANCTION_GENERATED",
            "sanction_letter": {
                "sanction_reference": "TC-SL-2024-0042",
                "customer_name": "Rajesh Kumar",
                "loan_amount": 300000,
                "interest_rate": 10.5,
                "tenure_months": 36,
                "emi_amount": 9751.2,
                "generated_date": "2024-11-02",
                "extra": "ignored"
            }
        }"#;
        let state: ApplicationState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.application_status, ApplicationStatus::SanctionGenerated);
        assert_eq!(state.sanction_reference(), Some("TC-SL-2024-0042"));
        assert_eq!(state.sanction_letter.unwrap().tenure_months, 36);
    }

    #[test]
    fn test_float_formatted_counts_still_decode() {
        let raw = r#"{
            "customer_name": "Rajesh",
            "credit_score": 742.0,
            "pre_approved_limit": 500000.0,
            "loan_application": {"application_id": "LA1", "loan_amount": 300000, "tenure_months": 36.0}
        }"#;
        let state: ApplicationState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.credit_score, Some(742));
        assert_eq!(state.pre_approved_limit, Some(500_000));
        let app = state.loan_application.unwrap();
        assert_eq!(app.tenure_months, 36);
        assert_eq!(app.loan_amount, 300_000.0);
    }

    #[test]
    fn test_string_formatted_numbers_still_decode() {
        let raw = r#"{
            "customer_salary": "85000",
            "credit_score": " 780 ",
            "sanction_letter": {
                "sanction_reference": "TC-SL-1",
                "loan_amount": "3,00,000",
                "interest_rate": "10.5",
                "tenure_months": "24"
            }
        }"#;
        let state: ApplicationState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.customer_salary, Some(85_000));
        assert_eq!(state.credit_score, Some(780));
        let letter = state.sanction_letter.unwrap();
        assert_eq!(letter.loan_amount, 300_000.0);
        assert_eq!(letter.interest_rate, 10.5);
        assert_eq!(letter.tenure_months, 24);
    }

    #[test]
    fn test_unusable_numbers_decode_as_absent() {
        let raw = r#"{
            "customer_name": "Rajesh",
            "credit_score": "pending",
            "pre_approved_limit": -5,
            "customer_salary": null,
            "loan_application": {"application_id": "LA1", "tenure_months": 36.5, "loan_amount": true}
        }"#;
        let state: ApplicationState = serde_json::from_str(raw).unwrap();
        assert_eq!(state.customer_name, "Rajesh");
        assert_eq!(state.credit_score, None);
        assert_eq!(state.pre_approved_limit, None);
        assert_eq!(state.customer_salary, None);
        let app = state.loan_application.unwrap();
        assert_eq!(app.tenure_months, 0);
        assert_eq!(app.loan_amount, 0.0);
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let state: ApplicationState =
            serde_json::from_str(r#"{"application_status": "UNDER_REVIEW"}"#).unwrap();
        assert_eq!(state.application_status, ApplicationStatus::Other("UNDER_REVIEW".into()));
        assert_eq!(state.application_status.as_str(), "UNDER_REVIEW");
    }

    #[test]
    fn test_progress_steps_follow_state() {
        let mut state = ApplicationState { kyc_verified: true, credit_score: Some(720), ..Default::default() };
        let steps = state.progress();
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].detail.as_deref(), Some("Score: 720"));
        assert_eq!(steps[2].status, StepStatus::Pending);
        assert_eq!(steps[3].status, StepStatus::Pending);

        state.application_status = ApplicationStatus::Rejected;
        assert_eq!(state.progress()[2].status, StepStatus::Error);

        state.application_status = ApplicationStatus::Approved;
        assert_eq!(state.progress()[2].status, StepStatus::Completed);
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(ScoreBand::from_score(800), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(750), ScoreBand::Good);
        assert_eq!(ScoreBand::from_score(749), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(700), ScoreBand::Fair);
        assert_eq!(ScoreBand::from_score(699), ScoreBand::Poor);
    }
}
