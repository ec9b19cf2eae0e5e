//! Deterministic demo data: six accounts, five requests across the
//! lifecycle, three documents and three invoices.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use tripdesk_core::domain::document::{Document, DocumentId, DocumentType};
use tripdesk_core::domain::invoice::{Invoice, InvoiceDraft, InvoiceId, InvoiceStatus, LineItem};
use tripdesk_core::domain::request::{
    CateringDetails, Request, RequestDetails, RequestId, RequestStatus, TravelDetails,
};
use tripdesk_core::domain::user::{Password, Role, User, UserId, UserStatus};
use tripdesk_core::ports::{Store, StoreError};

pub const DEMO_PASSWORD: &str = "demo123";
pub const ADMIN_PASSWORD: &str = "admin123";

/// Company on the demo vendor account.
pub const DEMO_VENDOR_COMPANY: &str = "Flight Centre Corporate Travel";

struct SeedUser {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: Role,
    company: Option<&'static str>,
    created: (i32, u32, u32),
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser { id: "USR-001", name: "Glenda", email: "glenda@mhfa.com.au", role: Role::Coordinator, company: None, created: (2025, 1, 1) },
    SeedUser { id: "USR-002", name: "Amanda", email: "amanda@mhfa.com.au", role: Role::Coordinator, company: None, created: (2025, 1, 1) },
    SeedUser { id: "USR-003", name: "Sarah", email: "sarah@mhfa.com.au", role: Role::Employee, company: None, created: (2025, 6, 15) },
    SeedUser { id: "USR-004", name: "David", email: "director@mhfa.com.au", role: Role::Approver, company: None, created: (2025, 1, 1) },
    SeedUser { id: "USR-005", name: "Mel", email: "mel@fcct.com.au", role: Role::Vendor, company: Some(DEMO_VENDOR_COMPANY), created: (2025, 3, 1) },
    SeedUser { id: "USR-006", name: "Admin", email: "admin@mhfa.com.au", role: Role::Admin, company: None, created: (2025, 1, 1) },
];

pub const SEED_REQUEST_IDS: &[&str] =
    &["REQ-2026-001", "REQ-2026-002", "REQ-2026-003", "REQ-2026-004", "REQ-2026-005"];

pub const SEED_INVOICE_IDS: &[&str] = &["INV-2026-001", "INV-2026-002", "INV-2025-001"];

pub const SEED_DOCUMENT_IDS: &[&str] = &["DOC-001", "DOC-002", "DOC-003"];

/// Stores the demo dataset is written into.
pub struct SeedTargets<'a> {
    pub users: &'a dyn Store<User>,
    pub requests: &'a dyn Store<Request>,
    pub documents: &'a dyn Store<Document>,
    pub invoices: &'a dyn Store<Invoice>,
}

pub struct DemoDataset;

impl DemoDataset {
    /// Inserts whatever part of the dataset is missing. Safe to rerun.
    pub async fn load(targets: &SeedTargets<'_>) -> Result<SeedResult, StoreError> {
        let mut result = SeedResult::default();

        for user in users() {
            if targets.users.get_by_id(&user.id.0).await?.is_none() {
                targets.users.create(user).await?;
                result.users_created += 1;
            }
        }
        for request in requests() {
            if targets.requests.get_by_id(&request.id.0).await?.is_none() {
                targets.requests.create(request).await?;
                result.requests_created += 1;
            }
        }
        for document in documents() {
            if targets.documents.get_by_id(&document.id.0).await?.is_none() {
                targets.documents.create(document).await?;
                result.documents_created += 1;
            }
        }
        for invoice in invoices()? {
            if targets.invoices.get_by_id(&invoice.id.0).await?.is_none() {
                targets.invoices.create(invoice).await?;
                result.invoices_created += 1;
            }
        }

        info!(
            event_name = "db.seed.loaded",
            users = result.users_created,
            requests = result.requests_created,
            documents = result.documents_created,
            invoices = result.invoices_created,
            "demo dataset loaded"
        );
        Ok(result)
    }

    /// Checks that every seeded record is present with its seeded status.
    pub async fn verify(targets: &SeedTargets<'_>) -> Result<VerificationResult, StoreError> {
        let mut checks = Vec::new();

        for seed in SEED_USERS {
            let found = targets.users.get_by_id(seed.id).await?;
            checks.push(SeedCheck::new(
                format!("user {}", seed.id),
                found.is_some_and(|user| user.role == seed.role && user.email == seed.email),
            ));
        }
        for request in requests() {
            let found = targets.requests.get_by_id(&request.id.0).await?;
            checks.push(SeedCheck::new(
                format!("request {}", request.id),
                found.is_some_and(|stored| stored.status == request.status),
            ));
        }
        for id in SEED_DOCUMENT_IDS {
            let found = targets.documents.get_by_id(id).await?;
            checks.push(SeedCheck::new(format!("document {id}"), found.is_some()));
        }
        for invoice in invoices()? {
            let found = targets.invoices.get_by_id(&invoice.id.0).await?;
            checks.push(SeedCheck::new(
                format!("invoice {}", invoice.id),
                found.is_some_and(|stored| {
                    stored.status == invoice.status && stored.totals() == invoice.totals()
                }),
            ));
        }

        let passed = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { passed, checks })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub users_created: usize,
    pub requests_created: usize,
    pub documents_created: usize,
    pub invoices_created: usize,
}

impl SeedResult {
    pub fn total(&self) -> usize {
        self.users_created + self.requests_created + self.documents_created + self.invoices_created
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedCheck {
    pub name: String,
    pub passed: bool,
}

impl SeedCheck {
    fn new(name: String, passed: bool) -> Self {
        Self { name, passed }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub checks: Vec<SeedCheck>,
}

impl VerificationResult {
    pub fn failures(&self) -> impl Iterator<Item = &SeedCheck> {
        self.checks.iter().filter(|check| !check.passed)
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap_or_default()
}

pub fn users() -> Vec<User> {
    SEED_USERS
        .iter()
        .map(|seed| User {
            id: UserId(seed.id.to_string()),
            name: seed.name.to_string(),
            email: seed.email.to_string(),
            password: Password::new(if seed.role == Role::Admin { ADMIN_PASSWORD } else { DEMO_PASSWORD }),
            role: seed.role,
            status: UserStatus::Active,
            company: seed.company.map(str::to_string),
            created: date(seed.created.0, seed.created.1, seed.created.2),
            version: 0,
        })
        .collect()
}

struct SeedRequest {
    id: &'static str,
    title: &'static str,
    status: RequestStatus,
    requester: (&'static str, &'static str, &'static str),
    estimate: i64,
    created: (i32, u32, u32),
    vendor: Option<&'static str>,
    details: RequestDetails,
}

fn travel(destination: &str, departure: NaiveDate, return_date: NaiveDate, purpose: &str) -> RequestDetails {
    RequestDetails::Travel(TravelDetails {
        origin: "Melbourne".to_string(),
        destination: destination.to_string(),
        departure,
        return_date: Some(return_date),
        travellers: 1,
        purpose: purpose.to_string(),
        cost_centre: "CC-100".to_string(),
        preferences: String::new(),
    })
}

fn catering(location: &str, event_date: NaiveDate, attendees: u32, meals: &[&str]) -> RequestDetails {
    RequestDetails::Catering(CateringDetails {
        event_date,
        event_time: Some("12:00".to_string()),
        location: location.to_string(),
        attendees,
        meal_types: meals.iter().map(|meal| meal.to_string()).collect(),
        dietary: String::new(),
        instructions: String::new(),
        cost_centre: "CC-200".to_string(),
    })
}

pub fn requests() -> Vec<Request> {
    // Requesters without an account keep an empty id and match by name.
    let seeds = [
        SeedRequest {
            id: "REQ-2026-001",
            title: "Sydney Conference - Feb 2026",
            status: RequestStatus::AwaitingApproval,
            requester: ("USR-003", "Sarah", "sarah@mhfa.com.au"),
            estimate: 1850,
            created: (2026, 1, 14),
            vendor: None,
            details: travel("Sydney", date(2026, 2, 10), date(2026, 2, 12), "Conference"),
        },
        SeedRequest {
            id: "REQ-2026-002",
            title: "Team Planning Day Lunch",
            status: RequestStatus::Submitted,
            requester: ("", "Michael", "michael@mhfa.com.au"),
            estimate: 625,
            created: (2026, 1, 15),
            vendor: None,
            details: catering("MHFA Office", date(2026, 2, 3), 25, &["lunch"]),
        },
        SeedRequest {
            id: "REQ-2026-003",
            title: "Perth Training Delivery",
            status: RequestStatus::Quoting,
            requester: ("", "Emma", "emma@mhfa.com.au"),
            estimate: 2400,
            created: (2026, 1, 12),
            vendor: Some("USR-005"),
            details: travel("Perth", date(2026, 2, 20), date(2026, 2, 22), "Training delivery"),
        },
        SeedRequest {
            id: "REQ-2026-004",
            title: "Brisbane Workshop",
            status: RequestStatus::Booked,
            requester: ("", "James", "james@mhfa.com.au"),
            estimate: 980,
            created: (2026, 1, 8),
            vendor: Some("USR-005"),
            details: travel("Brisbane", date(2026, 2, 5), date(2026, 2, 6), "Workshop"),
        },
        SeedRequest {
            id: "REQ-2026-005",
            title: "Board Meeting Catering",
            status: RequestStatus::Approved,
            requester: ("USR-002", "Amanda", "amanda@mhfa.com.au"),
            estimate: 360,
            created: (2026, 1, 13),
            vendor: None,
            details: catering("Board Room", date(2026, 1, 28), 12, &["morning tea", "lunch"]),
        },
    ];

    seeds
        .into_iter()
        .map(|seed| {
            let created = at(seed.created.0, seed.created.1, seed.created.2, 9, 0);
            Request {
                id: RequestId(seed.id.to_string()),
                title: seed.title.to_string(),
                status: seed.status,
                details: seed.details,
                requester: seed.requester.1.to_string(),
                requester_id: UserId(seed.requester.0.to_string()),
                requester_email: seed.requester.2.to_string(),
                estimate: Decimal::new(seed.estimate, 0),
                created,
                updated_at: created,
                assigned_vendor: seed.vendor.map(|id| UserId(id.to_string())),
                notes: Vec::new(),
                quote_options: Vec::new(),
                selected_option: None,
                version: 0,
            }
        })
        .collect()
}

fn document(
    id: &str,
    request_id: &str,
    doc_type: DocumentType,
    file_name: &str,
    uploaded_at: DateTime<Utc>,
    metadata: &[(&str, &str)],
) -> Document {
    Document {
        id: DocumentId(id.to_string()),
        request_id: RequestId(request_id.to_string()),
        doc_type,
        file_name: file_name.to_string(),
        metadata: metadata
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<BTreeMap<_, _>>(),
        uploaded_by: "Glenda".to_string(),
        uploaded_at,
        forwarded_to_finance: false,
        forwarded_at: None,
        forwarded_by: None,
        version: 0,
    }
}

pub fn documents() -> Vec<Document> {
    vec![
        document(
            "DOC-001",
            "REQ-2026-003",
            DocumentType::Quote,
            "FCCT_Quote_Perth_Feb2026.pdf",
            at(2026, 1, 12, 14, 30),
            &[("supplier", "Flight Centre"), ("amount", "2400"), ("currency", "AUD")],
        ),
        document(
            "DOC-002",
            "REQ-2026-004",
            DocumentType::Itinerary,
            "Brisbane_Workshop_Itinerary.pdf",
            at(2026, 1, 9, 10, 15),
            &[("carrier", "Qantas")],
        ),
        document(
            "DOC-003",
            "REQ-2026-004",
            DocumentType::Invoice,
            "FCCT_Invoice_001234.pdf",
            at(2026, 1, 10, 9, 0),
            &[("supplier", "Flight Centre"), ("invoiceNumber", "FCCT-001234"), ("amount", "980")],
        ),
    ]
}

fn line(id: u32, description: &str, quantity: u32, unit_price: i64) -> LineItem {
    LineItem::new(id, description, quantity, Decimal::new(unit_price, 0))
}

pub fn invoices() -> Result<Vec<Invoice>, StoreError> {
    let seeds = [
        (
            "INV-2026-001",
            InvoiceStatus::Sent,
            "Glenda",
            at(2026, 1, 10, 9, 0),
            InvoiceDraft {
                request_id: RequestId("REQ-2026-004".to_string()),
                request_title: "Brisbane Workshop".to_string(),
                vendor: DEMO_VENDOR_COMPANY.to_string(),
                vendor_email: "invoices@fcct.com.au".to_string(),
                line_items: vec![
                    line(1, "Return Flight MEL-BNE (Economy)", 1, 450),
                    line(2, "Hotel Accommodation (2 nights)", 2, 180),
                    line(3, "Airport Transfers", 2, 45),
                ],
                issue_date: date(2026, 1, 10),
                due_date: date(2026, 2, 10),
                notes: "Booking reference: FCCT-78234".to_string(),
            },
        ),
        (
            "INV-2026-002",
            InvoiceStatus::Draft,
            "Glenda",
            at(2026, 1, 15, 14, 30),
            InvoiceDraft {
                request_id: RequestId("REQ-2026-005".to_string()),
                request_title: "Board Meeting Catering".to_string(),
                vendor: "Gourmet Events Co".to_string(),
                vendor_email: "accounts@gourmetevents.com.au".to_string(),
                line_items: vec![
                    line(1, "Executive Lunch Package (12 pax)", 12, 28),
                    line(2, "Premium Beverage Service", 1, 85),
                    line(3, "Setup & Service Staff (2 hrs)", 2, 45),
                ],
                issue_date: date(2026, 1, 15),
                due_date: date(2026, 2, 15),
                notes: String::new(),
            },
        ),
        (
            "INV-2025-001",
            InvoiceStatus::Overdue,
            "Amanda",
            at(2025, 12, 20, 11, 0),
            InvoiceDraft {
                request_id: RequestId("REQ-2026-003".to_string()),
                request_title: "Perth Training Delivery".to_string(),
                vendor: DEMO_VENDOR_COMPANY.to_string(),
                vendor_email: "invoices@fcct.com.au".to_string(),
                line_items: vec![
                    line(1, "Return Flight MEL-PER (Business)", 1, 1200),
                    line(2, "Hotel Accommodation (3 nights)", 3, 220),
                    line(3, "Car Hire (3 days)", 3, 85),
                    line(4, "Travel Insurance", 1, 65),
                ],
                issue_date: date(2025, 12, 20),
                due_date: date(2026, 1, 5),
                notes: "Please follow up with vendor".to_string(),
            },
        ),
    ];

    seeds
        .into_iter()
        .map(|(id, status, created_by, created_at, draft)| {
            let mut invoice = Invoice::open(draft, created_by, created_at)
                .map_err(|error| StoreError::Backend(format!("seed invoice {id}: {error}")))?;
            invoice.id = InvoiceId(id.to_string());
            invoice.status = status;
            Ok(invoice)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use tripdesk_core::domain::document::Document;
    use tripdesk_core::domain::invoice::Invoice;
    use tripdesk_core::domain::request::Request;
    use tripdesk_core::domain::user::User;
    use tripdesk_core::ports::Store;

    use super::{invoices, DemoDataset, SeedTargets};
    use crate::repositories::InMemoryStore;

    #[test]
    fn seeded_invoice_totals_carry_ten_percent_gst() {
        let invoices = invoices().expect("seed invoices");
        let totals: Vec<_> = invoices.iter().map(|invoice| invoice.totals().total).collect();
        assert_eq!(
            totals,
            vec![Decimal::new(990, 0), Decimal::new(56210, 2), Decimal::new(2398, 0)]
        );
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let users = InMemoryStore::<User>::new();
        let requests = InMemoryStore::<Request>::new();
        let documents = InMemoryStore::<Document>::new();
        let invoices = InMemoryStore::<Invoice>::new();
        let targets = SeedTargets {
            users: &users,
            requests: &requests,
            documents: &documents,
            invoices: &invoices,
        };

        let first = DemoDataset::load(&targets).await.expect("first load");
        assert_eq!(first.total(), 6 + 5 + 3 + 3);
        let second = DemoDataset::load(&targets).await.expect("second load");
        assert_eq!(second.total(), 0);

        let verification = DemoDataset::verify(&targets).await.expect("verify");
        assert!(verification.passed, "failures: {:?}", verification.failures().collect::<Vec<_>>());

        let next = requests.list().await.expect("list").len();
        assert_eq!(next, 5);
    }
}
