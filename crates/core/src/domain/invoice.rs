use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::request::{Request, RequestDetails, RequestId};
use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Paid => "PAID",
            Self::Overdue => "OVERDUE",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Sent | Self::Overdue)
    }

    /// Line items stay editable until the invoice is settled or voided.
    pub fn allows_line_item_edits(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent | Self::Overdue)
    }

    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Paid)
                | (Self::Sent, Self::Overdue)
                | (Self::Overdue, Self::Paid)
                | (Self::Draft, Self::Cancelled)
                | (Self::Sent, Self::Cancelled)
                | (Self::Overdue, Self::Cancelled)
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: u32,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(id: u32, description: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self { id, description: description.into(), quantity, unit_price }
    }

    pub fn amount(&self) -> Result<Decimal, WorkflowError> {
        Decimal::from(self.quantity).checked_mul(self.unit_price).ok_or_else(out_of_range)
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.description.trim().is_empty() {
            return Err(WorkflowError::validation("line item description is required"));
        }
        if self.quantity == 0 {
            return Err(WorkflowError::validation("line item quantity must be positive"));
        }
        if self.unit_price <= Decimal::ZERO {
            return Err(WorkflowError::validation("line item unit price must be positive"));
        }
        Ok(())
    }
}

fn out_of_range() -> WorkflowError {
    WorkflowError::validation("invoice amount out of range")
}

pub const GST_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Rounds to cents, half away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    /// Fails instead of overflowing when the amounts exceed `Decimal`.
    pub fn compute(line_items: &[LineItem]) -> Result<Self, WorkflowError> {
        let mut subtotal = Decimal::ZERO;
        for item in line_items {
            subtotal = subtotal.checked_add(item.amount()?).ok_or_else(out_of_range)?;
        }
        let subtotal = round_currency(subtotal);
        let gst = round_currency(subtotal.checked_mul(GST_RATE).ok_or_else(out_of_range)?);
        let total = subtotal.checked_add(gst).ok_or_else(out_of_range)?;
        Ok(Self { subtotal, gst, total })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub request_id: RequestId,
    #[serde(default)]
    pub request_title: String,
    pub status: InvoiceStatus,
    pub vendor: String,
    #[serde(default)]
    pub vendor_email: String,
    line_items: Vec<LineItem>,
    subtotal: Decimal,
    gst: Decimal,
    total: Decimal,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// Fields needed to open a new invoice; totals are derived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub request_id: RequestId,
    #[serde(default)]
    pub request_title: String,
    pub vendor: String,
    #[serde(default)]
    pub vendor_email: String,
    pub line_items: Vec<LineItem>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub notes: String,
}

impl InvoiceDraft {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.vendor.trim().is_empty() {
            return Err(WorkflowError::validation("invoice vendor is required"));
        }
        if self.line_items.is_empty() {
            return Err(WorkflowError::validation("invoice needs at least one line item"));
        }
        if self.due_date < self.issue_date {
            return Err(WorkflowError::validation("due date must not precede issue date"));
        }
        self.line_items.iter().try_for_each(LineItem::validate)
    }

    /// Derives billable lines from the request estimate.
    pub fn from_request(request: &Request, issue_date: NaiveDate, payment_terms_days: u32) -> Self {
        let line_items = match &request.details {
            RequestDetails::Travel(travel) => {
                let estimate = request.estimate;
                vec![
                    LineItem::new(
                        1,
                        format!("Flights - {} to {}", travel.origin, travel.destination),
                        1,
                        round_currency(estimate * Decimal::new(50, 2)),
                    ),
                    LineItem::new(
                        2,
                        format!("Accommodation - {}", travel.destination),
                        1,
                        round_currency(estimate * Decimal::new(35, 2)),
                    ),
                    LineItem::new(
                        3,
                        "Ground transfers".to_string(),
                        1,
                        round_currency(estimate * Decimal::new(15, 2)),
                    ),
                ]
            }
            RequestDetails::Catering(catering) => {
                let attendees = catering.attendees.max(1);
                vec![
                    LineItem::new(
                        1,
                        format!("Catering - {}", catering.location),
                        attendees,
                        round_currency(request.estimate / Decimal::from(attendees)),
                    ),
                    LineItem::new(2, "Setup and service".to_string(), 1, Decimal::new(50, 0)),
                ]
            }
        };

        Self {
            request_id: request.id.clone(),
            request_title: request.title.clone(),
            vendor: String::new(),
            vendor_email: String::new(),
            line_items,
            issue_date,
            due_date: issue_date + Duration::days(i64::from(payment_terms_days)),
            notes: String::new(),
        }
    }
}

impl Invoice {
    pub fn open(draft: InvoiceDraft, created_by: &str, now: DateTime<Utc>) -> Result<Self, WorkflowError> {
        draft.validate()?;
        let totals = InvoiceTotals::compute(&draft.line_items)?;
        Ok(Self {
            id: InvoiceId(String::new()),
            request_id: draft.request_id,
            request_title: draft.request_title,
            status: InvoiceStatus::Draft,
            vendor: draft.vendor.trim().to_string(),
            vendor_email: draft.vendor_email,
            line_items: draft.line_items,
            subtotal: totals.subtotal,
            gst: totals.gst,
            total: totals.total,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            notes: draft.notes,
            created_by: created_by.to_string(),
            created_at: now,
            version: 0,
        })
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals { subtotal: self.subtotal, gst: self.gst, total: self.total }
    }

    /// Replaces the line items and recomputes every derived amount.
    pub fn replace_line_items(&mut self, line_items: Vec<LineItem>) -> Result<(), WorkflowError> {
        if !self.status.allows_line_item_edits() {
            return Err(WorkflowError::invalid_transition(self.status, "update_line_items"));
        }
        if line_items.is_empty() {
            return Err(WorkflowError::validation("invoice needs at least one line item"));
        }
        line_items.iter().try_for_each(LineItem::validate)?;
        let totals = InvoiceTotals::compute(&line_items)?;
        self.line_items = line_items;
        self.subtotal = totals.subtotal;
        self.gst = totals.gst;
        self.total = totals.total;
        Ok(())
    }

    pub fn transition_to(&mut self, next: InvoiceStatus, action: &str) -> Result<InvoiceStatus, WorkflowError> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::invalid_transition(self.status, action));
        }
        let previous = self.status;
        self.status = next;
        Ok(previous)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total: usize,
    pub draft: usize,
    pub sent: usize,
    pub paid: usize,
    pub overdue: usize,
    pub cancelled: usize,
    pub total_value: Decimal,
    pub outstanding: Decimal,
}

impl InvoiceStats {
    pub fn from_invoices<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        let mut stats = Self::default();
        for invoice in invoices {
            stats.total += 1;
            stats.total_value = stats.total_value.saturating_add(invoice.total);
            match invoice.status {
                InvoiceStatus::Draft => stats.draft += 1,
                InvoiceStatus::Sent => stats.sent += 1,
                InvoiceStatus::Paid => stats.paid += 1,
                InvoiceStatus::Overdue => stats.overdue += 1,
                InvoiceStatus::Cancelled => stats.cancelled += 1,
            }
            if invoice.status.is_outstanding() {
                stats.outstanding = stats.outstanding.saturating_add(invoice.total);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{
        round_currency, Invoice, InvoiceDraft, InvoiceStats, InvoiceStatus, InvoiceTotals, LineItem,
    };
    use crate::domain::request::{
        CateringDetails, Request, RequestDetails, RequestId, RequestStatus, TravelDetails,
    };
    use crate::domain::user::UserId;
    use crate::errors::WorkflowError;

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    fn items(rows: &[(u32, &str)]) -> Vec<LineItem> {
        rows.iter()
            .enumerate()
            .map(|(index, (qty, price))| LineItem::new(index as u32 + 1, "line", *qty, dec(price)))
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn draft(line_items: Vec<LineItem>) -> InvoiceDraft {
        InvoiceDraft {
            request_id: RequestId("REQ-2026-001".to_string()),
            request_title: "Team lunch".to_string(),
            vendor: "Harbour Catering".to_string(),
            vendor_email: "accounts@harbour.example".to_string(),
            line_items,
            issue_date: date(2026, 1, 5),
            due_date: date(2026, 2, 4),
            notes: String::new(),
        }
    }

    fn request(details: RequestDetails, estimate: &str) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId("REQ-2026-004".to_string()),
            title: "Fixture".to_string(),
            status: RequestStatus::Booked,
            details,
            requester: "Sarah".to_string(),
            requester_id: UserId("USR-003".to_string()),
            requester_email: "sarah@example.org".to_string(),
            estimate: dec(estimate),
            created: now,
            updated_at: now,
            assigned_vendor: None,
            notes: Vec::new(),
            quote_options: Vec::new(),
            selected_option: None,
            version: 0,
        }
    }

    #[test]
    fn totals_match_travel_fixture() {
        let totals = InvoiceTotals::compute(&items(&[(1, "450"), (2, "180"), (2, "45")])).expect("in range");
        assert_eq!(totals.subtotal, dec("900"));
        assert_eq!(totals.gst, dec("90"));
        assert_eq!(totals.total, dec("990"));
    }

    #[test]
    fn totals_match_catering_fixture() {
        let totals = InvoiceTotals::compute(&items(&[(12, "28"), (1, "85"), (2, "45")])).expect("in range");
        assert_eq!(totals.subtotal, dec("511"));
        assert_eq!(totals.gst, dec("51.10"));
        assert_eq!(totals.total, dec("562.10"));
    }

    #[test]
    fn totals_match_conference_fixture() {
        let totals = InvoiceTotals::compute(&items(&[(1, "1450"), (2, "320"), (1, "90")])).expect("in range");
        assert_eq!(totals.subtotal, dec("2180"));
        assert_eq!(totals.gst, dec("218"));
        assert_eq!(totals.total, dec("2398"));
    }

    #[test]
    fn gst_rounds_half_away_from_zero() {
        // 0.45 * 10% = 0.045, which banker's rounding would take to 0.04.
        let totals = InvoiceTotals::compute(&items(&[(1, "0.45")])).expect("in range");
        assert_eq!(totals.gst, dec("0.05"));
        assert_eq!(totals.total, dec("0.50"));
        assert_eq!(round_currency(dec("2.675")), dec("2.68"));
    }

    #[test]
    fn replacing_line_items_recomputes_totals() {
        let mut invoice =
            Invoice::open(draft(items(&[(1, "450")])), "Glenda", Utc::now()).expect("opens");
        invoice
            .replace_line_items(items(&[(12, "28"), (1, "85"), (2, "45")]))
            .expect("editable while draft");
        assert_eq!(invoice.totals().total, dec("562.10"));
    }

    #[test]
    fn paid_invoice_rejects_line_item_edits() {
        let mut invoice =
            Invoice::open(draft(items(&[(1, "450")])), "Glenda", Utc::now()).expect("opens");
        invoice.transition_to(InvoiceStatus::Sent, "send").expect("draft to sent");
        invoice.transition_to(InvoiceStatus::Paid, "mark_paid").expect("sent to paid");

        let error = invoice.replace_line_items(items(&[(1, "1")])).expect_err("paid is locked");
        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
        assert_eq!(invoice.totals().total, dec("495"));
    }

    #[test]
    fn invoice_status_graph() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Sent));
        assert!(Overdue.can_transition_to(Paid));
        assert!(Overdue.can_transition_to(Cancelled));
        assert!(!Draft.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Draft));
        for status in InvoiceStatus::ALL {
            if status.is_terminal() {
                assert!(InvoiceStatus::ALL.iter().all(|next| !status.can_transition_to(*next)));
            }
        }
    }

    #[test]
    fn oversized_amounts_fail_validation_instead_of_overflowing() {
        let huge = vec![LineItem::new(1, "x", 10, Decimal::MAX)];
        assert_eq!(
            InvoiceTotals::compute(&huge),
            Err(WorkflowError::validation("invoice amount out of range"))
        );

        let error = Invoice::open(draft(huge), "Glenda", Utc::now()).expect_err("overflow");
        assert!(matches!(error, WorkflowError::Validation(_)));

        let halves = items(&[(1, "1"), (1, "1")])
            .into_iter()
            .map(|item| LineItem { unit_price: Decimal::MAX - Decimal::ONE, ..item })
            .collect();
        let mut invoice =
            Invoice::open(draft(items(&[(1, "450")])), "Glenda", Utc::now()).expect("opens");
        let error = invoice.replace_line_items(halves).expect_err("sum overflows");
        assert!(matches!(error, WorkflowError::Validation(_)));
        assert_eq!(invoice.totals().total, dec("495"));
    }

    #[test]
    fn zero_quantity_line_item_is_invalid() {
        let error = Invoice::open(draft(items(&[(0, "10")])), "Glenda", Utc::now())
            .expect_err("zero quantity");
        assert!(matches!(error, WorkflowError::Validation(_)));
    }

    #[test]
    fn travel_request_splits_estimate() {
        let request = request(
            RequestDetails::Travel(TravelDetails {
                origin: "Melbourne".to_string(),
                destination: "Sydney".to_string(),
                departure: date(2026, 2, 10),
                return_date: None,
                travellers: 1,
                purpose: String::new(),
                cost_centre: String::new(),
                preferences: String::new(),
            }),
            "1850",
        );
        let draft = InvoiceDraft::from_request(&request, date(2026, 3, 1), 30);
        let amounts: Vec<_> =
            draft.line_items.iter().map(|item| item.amount().expect("in range")).collect();
        assert_eq!(amounts, vec![dec("925.00"), dec("647.50"), dec("277.50")]);
        assert_eq!(draft.due_date, date(2026, 3, 31));
    }

    #[test]
    fn catering_request_prices_per_head_plus_setup() {
        let request = request(
            RequestDetails::Catering(CateringDetails {
                event_date: date(2026, 1, 20),
                event_time: None,
                location: "Level 3 boardroom".to_string(),
                attendees: 25,
                meal_types: Vec::new(),
                dietary: String::new(),
                instructions: String::new(),
                cost_centre: String::new(),
            }),
            "625",
        );
        let draft = InvoiceDraft::from_request(&request, date(2026, 1, 21), 14);
        assert_eq!(draft.line_items[0].quantity, 25);
        assert_eq!(draft.line_items[0].unit_price, dec("25.00"));
        assert_eq!(draft.line_items[1].unit_price, dec("50"));
        assert_eq!(InvoiceTotals::compute(&draft.line_items).expect("in range").subtotal, dec("675"));
    }

    #[test]
    fn stats_count_outstanding_sent_and_overdue() {
        let mut sent = Invoice::open(draft(items(&[(1, "100")])), "Glenda", Utc::now()).expect("opens");
        sent.transition_to(InvoiceStatus::Sent, "send").expect("sent");
        let mut overdue = sent.clone();
        overdue.transition_to(InvoiceStatus::Overdue, "mark_overdue").expect("overdue");
        let open = Invoice::open(draft(items(&[(1, "50")])), "Glenda", Utc::now()).expect("opens");

        let stats = InvoiceStats::from_invoices([&sent, &overdue, &open]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.outstanding, dec("220"));
        assert_eq!(stats.total_value, dec("275"));
    }
}
