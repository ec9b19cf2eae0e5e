//! Static role to permission table.
//!
//! Lookups fail closed: a missing user, or a label outside the canonical role
//! set, holds no permissions at all.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, User};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    RequestCreate,
    RequestViewOwn,
    RequestViewAll,
    RequestEditOwn,
    RequestEditAll,
    RequestCancelOwn,
    RequestCancelAll,
    WorkflowTriage,
    WorkflowApprove,
    WorkflowReject,
    WorkflowAssignVendor,
    WorkflowQuote,
    WorkflowBook,
    DocumentUpload,
    DocumentViewOwn,
    DocumentViewAll,
    DocumentViewAssigned,
    DocumentDelete,
    DocumentForwardFinance,
    AdminViewAudit,
    AdminManageUsers,
    AdminManageDelegation,
    FinanceViewInvoices,
    FinanceManageInvoices,
    FinanceReconcile,
    FinanceExport,
}

impl Permission {
    pub const ALL: [Permission; 26] = [
        Permission::RequestCreate,
        Permission::RequestViewOwn,
        Permission::RequestViewAll,
        Permission::RequestEditOwn,
        Permission::RequestEditAll,
        Permission::RequestCancelOwn,
        Permission::RequestCancelAll,
        Permission::WorkflowTriage,
        Permission::WorkflowApprove,
        Permission::WorkflowReject,
        Permission::WorkflowAssignVendor,
        Permission::WorkflowQuote,
        Permission::WorkflowBook,
        Permission::DocumentUpload,
        Permission::DocumentViewOwn,
        Permission::DocumentViewAll,
        Permission::DocumentViewAssigned,
        Permission::DocumentDelete,
        Permission::DocumentForwardFinance,
        Permission::AdminViewAudit,
        Permission::AdminManageUsers,
        Permission::AdminManageDelegation,
        Permission::FinanceViewInvoices,
        Permission::FinanceManageInvoices,
        Permission::FinanceReconcile,
        Permission::FinanceExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreate => "request:create",
            Self::RequestViewOwn => "request:view_own",
            Self::RequestViewAll => "request:view_all",
            Self::RequestEditOwn => "request:edit_own",
            Self::RequestEditAll => "request:edit_all",
            Self::RequestCancelOwn => "request:cancel_own",
            Self::RequestCancelAll => "request:cancel_all",
            Self::WorkflowTriage => "workflow:triage",
            Self::WorkflowApprove => "workflow:approve",
            Self::WorkflowReject => "workflow:reject",
            Self::WorkflowAssignVendor => "workflow:assign_vendor",
            Self::WorkflowQuote => "workflow:quote",
            Self::WorkflowBook => "workflow:book",
            Self::DocumentUpload => "document:upload",
            Self::DocumentViewOwn => "document:view_own",
            Self::DocumentViewAll => "document:view_all",
            Self::DocumentViewAssigned => "document:view_assigned",
            Self::DocumentDelete => "document:delete",
            Self::DocumentForwardFinance => "document:forward_finance",
            Self::AdminViewAudit => "admin:view_audit",
            Self::AdminManageUsers => "admin:manage_users",
            Self::AdminManageDelegation => "admin:manage_delegation",
            Self::FinanceViewInvoices => "finance:view_invoices",
            Self::FinanceManageInvoices => "finance:manage_invoices",
            Self::FinanceReconcile => "finance:reconcile",
            Self::FinanceExport => "finance:export",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL.into_iter().find(|permission| permission.as_str() == token)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use Permission::*;

const EMPLOYEE: &[Permission] = &[
    RequestCreate,
    RequestViewOwn,
    RequestEditOwn,
    RequestCancelOwn,
    DocumentViewOwn,
    DocumentUpload,
];

const COORDINATOR: &[Permission] = &[
    RequestCreate,
    RequestViewOwn,
    RequestViewAll,
    RequestEditOwn,
    RequestEditAll,
    RequestCancelOwn,
    RequestCancelAll,
    WorkflowTriage,
    WorkflowApprove,
    WorkflowReject,
    WorkflowAssignVendor,
    WorkflowQuote,
    WorkflowBook,
    DocumentViewOwn,
    DocumentViewAll,
    DocumentUpload,
    DocumentDelete,
    DocumentForwardFinance,
    AdminViewAudit,
    AdminManageDelegation,
    FinanceViewInvoices,
    FinanceManageInvoices,
];

const APPROVER: &[Permission] = &[
    RequestCreate,
    RequestViewOwn,
    RequestViewAll,
    WorkflowApprove,
    WorkflowReject,
    DocumentViewAll,
    DocumentUpload,
];

// Vendors reach requests only through assignment.
const VENDOR: &[Permission] = &[DocumentViewAssigned, DocumentUpload, WorkflowQuote];

const FINANCE: &[Permission] = &[
    RequestViewAll,
    DocumentViewAll,
    FinanceViewInvoices,
    FinanceReconcile,
    FinanceExport,
    AdminViewAudit,
];

pub fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Employee => EMPLOYEE,
        Role::Coordinator => COORDINATOR,
        Role::Approver => APPROVER,
        Role::Vendor => VENDOR,
        Role::Finance => FINANCE,
        Role::Admin => &Permission::ALL,
    }
}

pub fn role_has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

pub fn has_permission(user: Option<&User>, permission: Permission) -> bool {
    user.is_some_and(|user| role_has_permission(user.role, permission))
}

/// Label-based lookup for callers holding a raw role string.
pub fn has_permission_for_label(label: &str, permission: Permission) -> bool {
    Role::from_label(label).is_some_and(|role| role_has_permission(role, permission))
}
