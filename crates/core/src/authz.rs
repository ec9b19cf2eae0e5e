//! Authorization decisions over users, requests and documents.
//!
//! Every check here is total: a missing user or entity is a denial, never an
//! error.

use serde::{Deserialize, Serialize};

use crate::domain::document::Document;
use crate::domain::request::Request;
use crate::domain::user::{Role, User};
use crate::flows::engine::{actor_rule_holds, rules_for};
use crate::flows::states::RequestAction;
use crate::rbac::{has_permission, Permission};

pub fn can_access_request(user: Option<&User>, request: Option<&Request>) -> bool {
    let (Some(user), Some(request)) = (user, request) else {
        return false;
    };
    if has_permission(Some(user), Permission::RequestViewAll) {
        return true;
    }
    if user.role == Role::Vendor {
        return request.is_assigned_to(user);
    }
    request.is_requested_by(user)
}

pub fn can_edit_request(user: Option<&User>, request: Option<&Request>) -> bool {
    let (Some(user), Some(request)) = (user, request) else {
        return false;
    };
    if has_permission(Some(user), Permission::RequestEditAll) {
        return true;
    }
    has_permission(Some(user), Permission::RequestEditOwn)
        && request.is_requested_by(user)
        && request.status.is_requester_editable()
}

pub fn can_upload_document(user: Option<&User>, request: Option<&Request>) -> bool {
    has_permission(user, Permission::DocumentUpload) && can_access_request(user, request)
}

pub fn can_view_document(
    user: Option<&User>,
    document: Option<&Document>,
    request: Option<&Request>,
) -> bool {
    let (Some(user), Some(document), Some(request)) = (user, document, request) else {
        return false;
    };
    if document.request_id != request.id {
        return false;
    }
    if has_permission(Some(user), Permission::DocumentViewAll) {
        return true;
    }
    if has_permission(Some(user), Permission::DocumentViewAssigned) {
        return request.is_assigned_to(user);
    }
    if has_permission(Some(user), Permission::DocumentViewOwn) {
        return request.is_requested_by(user);
    }
    false
}

/// Actions the user may take on the request right now, in table order.
pub fn allowed_actions(user: Option<&User>, request: Option<&Request>) -> Vec<RequestAction> {
    let (Some(user), Some(request)) = (user, request) else {
        return Vec::new();
    };
    if !can_access_request(Some(user), Some(request)) {
        return Vec::new();
    }

    let mut actions: Vec<RequestAction> = Vec::new();
    for rule in rules_for(request.status) {
        if actor_rule_holds(rule.actor, user, request) && !actions.contains(&rule.action) {
            actions.push(rule.action);
        }
    }
    if !request.status.is_terminal() && can_upload_document(Some(user), Some(request)) {
        actions.push(RequestAction::UploadDocument);
    }
    actions
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuVisibility {
    pub dashboard: bool,
    pub my_requests: bool,
    pub all_requests: bool,
    pub approvals: bool,
    pub vendor_portal: bool,
    pub invoices: bool,
    pub reports: bool,
    pub audit_log: bool,
    pub users: bool,
}

impl MenuVisibility {
    fn everything() -> Self {
        Self {
            dashboard: true,
            my_requests: true,
            all_requests: true,
            approvals: true,
            vendor_portal: true,
            invoices: true,
            reports: true,
            audit_log: true,
            users: true,
        }
    }

    fn base() -> Self {
        Self { dashboard: true, my_requests: true, ..Self::default() }
    }
}

pub fn menu_visibility(user: Option<&User>) -> MenuVisibility {
    let Some(user) = user else {
        return MenuVisibility::default();
    };
    match user.role {
        Role::Coordinator | Role::Admin => MenuVisibility::everything(),
        Role::Approver => MenuVisibility { approvals: true, ..MenuVisibility::base() },
        Role::Vendor => MenuVisibility { vendor_portal: true, ..MenuVisibility::base() },
        Role::Finance => MenuVisibility {
            invoices: true,
            reports: true,
            audit_log: true,
            ..MenuVisibility::base()
        },
        Role::Employee => MenuVisibility::base(),
    }
}
