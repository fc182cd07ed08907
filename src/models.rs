//! Entity records synchronized by the facade.
//!
//! Entities are plain records, each independently keyed and independently
//! synchronized. There is no cross-entity transaction; the only relational
//! touch is a license's optional `application_id` back-reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// === Settings and content ===

/// One configurable parameter (pricing, contact info, feature flags).
/// Keys are the unit of update; last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub category: String,
}

/// Composite-keyed text/structured content for a page section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub section: String,
    pub key: String,
    pub value: Value,
}

impl ContentItem {
    /// Row id used by the gateway: `<section>:<key>`.
    pub fn content_id(&self) -> String {
        format!("{}:{}", self.section, self.key)
    }
}

// === Applications ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Processing => "processing",
        }
    }
}

/// A public license application submission.
///
/// Created by the storefront form, mutated only by admin status transitions,
/// never deleted in the common path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub category: String,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new application; everything not listed defaults server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub category: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub documents: Option<Vec<String>>,
}

impl Application {
    /// Materialize a submission: fresh id, `pending` status, current
    /// timestamps.
    pub fn from_submission(new: NewApplication) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            company: new.company,
            category: new.category,
            status: ApplicationStatus::Pending,
            amount: new.amount,
            payment_method: new.payment_method,
            transaction_id: new.transaction_id,
            documents: new.documents,
            created_at: now,
            updated_at: now,
        }
    }
}

// === Licenses ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Pending,
    Expired,
    Rejected,
    Suspended,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Pending => "pending",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Rejected => "rejected",
            LicenseStatus::Suspended => "suspended",
        }
    }
}

/// An issued trading-license certificate.
///
/// `license_id` is the human-facing code used for public verification;
/// the public lookup only ever returns records with `status = active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: Uuid,
    pub license_id: String,
    pub holder_name: String,
    pub license_type: String,
    pub status: LicenseStatus,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for an admin-created license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLicense {
    pub license_id: String,
    pub holder_name: String,
    pub license_type: String,
    #[serde(default)]
    pub status: Option<LicenseStatus>,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
}

impl License {
    pub fn from_new(new: NewLicense) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            license_id: new.license_id,
            holder_name: new.holder_name,
            license_type: new.license_type,
            status: new.status.unwrap_or(LicenseStatus::Pending),
            issue_date: new.issue_date,
            expiry_date: new.expiry_date,
            platforms: new.platforms,
            application_id: new.application_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }
}

// === Payment addresses ===

/// Deposit address for one cryptocurrency. One active address per currency
/// is the intended invariant, enforced on write by the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAddress {
    pub cryptocurrency: String,
    pub address: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_data: Option<String>,
}

// === License categories ===

/// Admin-managed catalog entry driving the pricing display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseCategory {
    pub category_number: u32,
    pub name: String,
    pub price: f64,
    pub min_volume: f64,
    pub validity_period_months: u32,
    pub available: bool,
    pub features: Vec<String>,
    pub icon: String,
    pub color: String,
    pub display_order: u32,
    pub popular: bool,
    pub exclusive: bool,
}

/// Partial update for a license category; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LicenseCategoryPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub min_volume: Option<f64>,
    #[serde(default)]
    pub validity_period_months: Option<u32>,
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub display_order: Option<u32>,
    #[serde(default)]
    pub popular: Option<bool>,
    #[serde(default)]
    pub exclusive: Option<bool>,
}

impl LicenseCategory {
    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &LicenseCategoryPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(min_volume) = patch.min_volume {
            self.min_volume = min_volume;
        }
        if let Some(months) = patch.validity_period_months {
            self.validity_period_months = months;
        }
        if let Some(available) = patch.available {
            self.available = available;
        }
        if let Some(features) = &patch.features {
            self.features = features.clone();
        }
        if let Some(icon) = &patch.icon {
            self.icon = icon.clone();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(order) = patch.display_order {
            self.display_order = order;
        }
        if let Some(popular) = patch.popular {
            self.popular = popular;
        }
        if let Some(exclusive) = patch.exclusive {
            self.exclusive = exclusive;
        }
    }
}

// === Contacts ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    New,
    Read,
    Responded,
    Archived,
}

/// An inbound contact-form message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new contact message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

impl Contact {
    pub fn from_submission(new: NewContact) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            subject: new.subject,
            message: new.message,
            status: ContactStatus::New,
            created_at: now,
            updated_at: now,
        }
    }
}
