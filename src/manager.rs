//! Unified data facade.
//!
//! `DataManager` is the single access point for consumers: encrypted local
//! store, broadcast transport, fallback poller, admin session and (when
//! connected) the remote gateway, wired together behind one API.
//!
//! The mutating template is uniform across entities: load the current
//! collection, compute the new one, persist it (remote first when a gateway
//! is connected, then the local cache), record an audit entry, and emit
//! exactly one logical `<entity>_updated` event carrying the refreshed
//! collection. The emitted payload is the full collection, so replaying it
//! is a no-op beyond the first application.
//!
//! Boundary policy: mutators return `bool`/`Option` and never propagate
//! storage or transport failures; reads return the best currently-known
//! snapshot without blocking on a network round trip.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::{AuditLog, SecurityEventKind};
use crate::broadcast::{BroadcastTransport, Listener, ListenerId};
use crate::config::CertsyncConfig;
use crate::errors::SyncResult;
use crate::events::{Envelope, EventKind};
use crate::gateway::{RemoteGateway, Table};
use crate::migration;
use crate::models::{
    Application, ApplicationStatus, Contact, ContactStatus, ContentItem, License, LicenseCategory,
    LicenseCategoryPatch, LicenseStatus, NewApplication, NewContact, NewLicense, PaymentAddress,
    Setting,
};
use crate::poller::FallbackPoller;
use crate::session::SessionManager;
use crate::store::SecureStore;
use crate::validation;

const SETTINGS_KEY: &str = "settings";
const CONTENT_KEY: &str = "content";
const APPLICATIONS_KEY: &str = "applications";
const LICENSES_KEY: &str = "licenses";
const PAYMENT_ADDRESSES_KEY: &str = "payment_addresses";
const LICENSE_CATEGORIES_KEY: &str = "license_categories";
const CONTACTS_KEY: &str = "contacts";
const SECURITY_EVENTS_KEY: &str = "security_events";

/// Single access point over store, transport, poller, session and gateway.
pub struct DataManager {
    store: Arc<SecureStore>,
    transport: Arc<BroadcastTransport>,
    gateway: Option<Arc<RemoteGateway>>,
    session: Arc<SessionManager>,
    audit: Arc<AuditLog>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DataManager {
    /// Open a local-only manager: encrypted store, transport and poller, no
    /// remote gateway. Used offline and in most tests.
    ///
    /// Must be called within a Tokio runtime; the poller and session monitor
    /// are spawned immediately.
    pub fn open(config: &CertsyncConfig) -> SyncResult<Self> {
        Self::build(config, None)
    }

    /// Open a manager connected to the remote gateway. The gateway becomes
    /// the system of record; the local store remains the offline cache.
    pub async fn open_with_gateway(config: &CertsyncConfig) -> SyncResult<Self> {
        let gateway = Arc::new(RemoteGateway::connect(&config.database).await?);
        Self::build(config, Some(gateway))
    }

    fn build(config: &CertsyncConfig, gateway: Option<Arc<RemoteGateway>>) -> SyncResult<Self> {
        let audit = Arc::new(AuditLog::new());
        let store = Arc::new(SecureStore::open(&config.storage, audit.clone())?);

        // Restore the persisted trail under anything recorded while opening
        // the store.
        audit.restore(store.secure_get(SECURITY_EVENTS_KEY, Vec::new()));

        let report = migration::migrate_legacy_plaintext(&store, &audit)?;
        if !report.migrated.is_empty() {
            info!(count = report.migrated.len(), "Legacy data migrated");
        }

        let transport = Arc::new(BroadcastTransport::new(
            config.sync.channel_capacity,
            store.data_dir(),
        ));
        let session = Arc::new(SessionManager::new(
            &config.session,
            &config.admin,
            store.clone(),
            transport.clone(),
            audit.clone(),
        ));

        let mut tasks = Vec::new();
        let poller = Arc::new(FallbackPoller::new(transport.clone(), &config.sync));
        tasks.push(poller.spawn());
        tasks.push(session.clone().spawn_monitor());
        if let Some(gw) = &gateway {
            if config.sync.refresh_interval_ms > 0 {
                tasks.push(RemoteGateway::spawn_refresh_task(
                    gw.clone(),
                    Duration::from_millis(config.sync.refresh_interval_ms),
                ));
            }
        }

        Ok(Self {
            store,
            transport,
            gateway,
            session,
            audit,
            tasks: Mutex::new(tasks),
        })
    }

    /// Cancel every background task this manager owns. Idempotent; the
    /// manager remains usable for synchronous reads afterwards.
    pub fn destroy(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        info!("Data manager destroyed; background tasks cancelled");
    }

    // === shared plumbing ===

    fn read_collection<T: DeserializeOwned>(&self, table: Table, key: &str) -> Vec<T> {
        match &self.gateway {
            Some(gw) => gw.typed_snapshot(table),
            None => self.store.secure_get(key, Vec::new()),
        }
    }

    /// Push one record to the remote, when connected. Returns false when the
    /// remote write fails, in which case the caller aborts the mutation.
    async fn push_remote<T: Serialize>(&self, table: Table, id: &str, entity: &T) -> bool {
        let Some(gw) = &self.gateway else {
            return true;
        };
        match gw.upsert(table, id, entity).await {
            Ok(()) => true,
            Err(e) => {
                warn!(table = %table, id, error = %e, "Remote write failed");
                self.record_audit(
                    SecurityEventKind::SecurityAlert,
                    format!("remote write failed for {table}/{id}: {e}"),
                );
                false
            }
        }
    }

    /// Cache the collection locally, audit the change, and emit exactly one
    /// logical update event carrying the refreshed collection.
    fn commit<T: Serialize>(&self, key: &str, event: EventKind, collection: &[T], detail: String) {
        self.store.secure_set(key, &collection);
        self.record_audit(SecurityEventKind::DataChange, detail);
        let payload = serde_json::to_value(collection).unwrap_or(Value::Null);
        self.transport.emit(event, payload);
    }

    fn record_audit(&self, kind: SecurityEventKind, details: String) {
        self.audit.record(kind, details);
        self.store
            .secure_set(SECURITY_EVENTS_KEY, &self.audit.snapshot());
    }

    // === settings ===

    pub fn get_settings(&self) -> Vec<Setting> {
        self.read_collection(Table::Settings, SETTINGS_KEY)
    }

    pub fn get_setting(&self, key: &str) -> Option<Setting> {
        self.get_settings().into_iter().find(|s| s.key == key)
    }

    /// Merge the given key/value pairs into the settings collection,
    /// last-write-wins per key. New keys land in the "general" category.
    ///
    /// Keys are the unit of update: only the keys named in `changes` are
    /// written remotely. Pushing the rest of the snapshot would rewrite
    /// keys this writer never touched with possibly stale values.
    pub async fn update_settings(&self, changes: HashMap<String, Value>) -> bool {
        if changes.is_empty() {
            return true;
        }

        let mut settings = self.get_settings();
        let mut touched = Vec::with_capacity(changes.len());
        for (key, value) in changes {
            match settings.iter_mut().find(|s| s.key == key) {
                Some(existing) => existing.value = value,
                None => settings.push(Setting {
                    key: key.clone(),
                    value,
                    category: "general".to_string(),
                }),
            }
            touched.push(key);
        }

        for setting in settings.iter().filter(|s| touched.contains(&s.key)) {
            if !self
                .push_remote(Table::Settings, &setting.key, setting)
                .await
            {
                return false;
            }
        }

        let count = touched.len();
        self.commit(
            SETTINGS_KEY,
            EventKind::SettingsUpdated,
            &settings,
            format!("settings updated ({count} keys)"),
        );
        true
    }

    // === content ===

    pub fn get_content(&self) -> Vec<ContentItem> {
        self.read_collection(Table::Content, CONTENT_KEY)
    }

    /// Upsert one content value under its composite `section:key` id.
    pub async fn update_content(&self, section: &str, key: &str, value: Value) -> bool {
        let mut content = self.get_content();
        match content
            .iter_mut()
            .find(|c| c.section == section && c.key == key)
        {
            Some(existing) => existing.value = value,
            None => content.push(ContentItem {
                section: section.to_string(),
                key: key.to_string(),
                value,
            }),
        }

        let item_id = format!("{section}:{key}");
        let Some(item) = content.iter().find(|c| c.content_id() == item_id) else {
            return false;
        };
        if !self.push_remote(Table::Content, &item_id, item).await {
            return false;
        }

        self.commit(
            CONTENT_KEY,
            EventKind::ContentUpdated,
            &content,
            format!("content updated: {item_id}"),
        );
        true
    }

    // === applications ===

    pub fn get_applications(&self) -> Vec<Application> {
        self.read_collection(Table::Applications, APPLICATIONS_KEY)
    }

    /// Accept a public application submission. Status starts as `pending`;
    /// payment fields are optional at submission time.
    pub async fn submit_application(&self, new: NewApplication) -> Option<Application> {
        if let Err(e) = validation::validate_not_empty(&new.name, "name")
            .and_then(|_| validation::validate_email(&new.email, "email"))
            .and_then(|_| validation::validate_category_number(&new.category, "category"))
            .and_then(|_| match new.transaction_id.as_deref() {
                Some(txid) => validation::validate_transaction_id(txid, "transaction_id"),
                None => Ok(()),
            })
        {
            warn!(error = %e, "Application submission rejected");
            return None;
        }

        let application = Application::from_submission(new);
        let mut applications = self.get_applications();
        applications.push(application.clone());

        if !self
            .push_remote(
                Table::Applications,
                &application.id.to_string(),
                &application,
            )
            .await
        {
            return None;
        }

        self.commit(
            APPLICATIONS_KEY,
            EventKind::ApplicationsUpdated,
            &applications,
            format!("application submitted: {}", application.id),
        );
        Some(application)
    }

    pub async fn update_application_status(
        &self,
        id: uuid::Uuid,
        status: ApplicationStatus,
    ) -> bool {
        let mut applications = self.get_applications();
        let Some(app) = applications.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        app.status = status;
        app.updated_at = chrono::Utc::now();
        let updated = app.clone();

        if !self
            .push_remote(Table::Applications, &updated.id.to_string(), &updated)
            .await
        {
            return false;
        }

        self.commit(
            APPLICATIONS_KEY,
            EventKind::ApplicationsUpdated,
            &applications,
            format!("application {} -> {}", id, status.as_str()),
        );
        true
    }

    // === licenses ===

    pub fn get_licenses(&self) -> Vec<License> {
        self.read_collection(Table::Licenses, LICENSES_KEY)
    }

    pub async fn add_license(&self, new: NewLicense) -> Option<License> {
        if let Err(e) = validation::validate_license_code(&new.license_id, "license_id")
            .and_then(|_| validation::validate_not_empty(&new.holder_name, "holder_name"))
        {
            warn!(error = %e, "License rejected");
            return None;
        }

        let license = License::from_new(new);
        let mut licenses = self.get_licenses();
        licenses.push(license.clone());

        if !self
            .push_remote(Table::Licenses, &license.id.to_string(), &license)
            .await
        {
            return None;
        }

        self.commit(
            LICENSES_KEY,
            EventKind::LicensesUpdated,
            &licenses,
            format!("license added: {}", license.license_id),
        );
        Some(license)
    }

    pub async fn update_license_status(&self, id: uuid::Uuid, status: LicenseStatus) -> bool {
        let mut licenses = self.get_licenses();
        let Some(license) = licenses.iter_mut().find(|l| l.id == id) else {
            return false;
        };
        license.status = status;
        license.updated_at = chrono::Utc::now();
        let updated = license.clone();

        if !self
            .push_remote(Table::Licenses, &updated.id.to_string(), &updated)
            .await
        {
            return false;
        }

        self.commit(
            LICENSES_KEY,
            EventKind::LicensesUpdated,
            &licenses,
            format!("license {} -> {}", id, status.as_str()),
        );
        true
    }

    /// Public license verification. Only an `active` license is returned;
    /// not-found and lookup failure are both `None`.
    pub async fn verify_license(&self, code: &str) -> Option<License> {
        if validation::validate_license_code(code, "license_code").is_err() {
            return None;
        }
        match &self.gateway {
            Some(gw) => gw.verify_license(code).await,
            None => self
                .get_licenses()
                .into_iter()
                .find(|l| l.license_id == code && l.is_active()),
        }
    }

    // === payment addresses ===

    pub fn get_payment_addresses(&self) -> Vec<PaymentAddress> {
        self.read_collection(Table::PaymentAddresses, PAYMENT_ADDRESSES_KEY)
    }

    /// Set the receiving address for a cryptocurrency. One active address
    /// per currency: any prior address for the same currency is deactivated.
    pub async fn set_payment_address(&self, address: PaymentAddress) -> bool {
        if validation::validate_not_empty(&address.address, "address").is_err()
            || validation::validate_not_empty(&address.cryptocurrency, "cryptocurrency").is_err()
        {
            return false;
        }

        let currency = address.cryptocurrency.clone();
        let mut addresses = self.get_payment_addresses();
        addresses.retain(|a| a.cryptocurrency != currency);

        // The row id is the currency, so upserting the new address is enough
        // to replace the prior remote row; other currencies stay untouched.
        if !self
            .push_remote(Table::PaymentAddresses, &currency, &address)
            .await
        {
            return false;
        }
        addresses.push(address);

        self.commit(
            PAYMENT_ADDRESSES_KEY,
            EventKind::PaymentAddressesUpdated,
            &addresses,
            format!("payment address set for {currency}"),
        );
        true
    }

    // === license categories ===

    pub fn get_license_categories(&self) -> Vec<LicenseCategory> {
        self.read_collection(Table::LicenseCategories, LICENSE_CATEGORIES_KEY)
    }

    pub async fn add_license_category(&self, category: LicenseCategory) -> bool {
        let mut categories = self.get_license_categories();
        if categories
            .iter()
            .any(|c| c.category_number == category.category_number)
        {
            warn!(
                category = category.category_number,
                "Category number already exists"
            );
            return false;
        }
        let number = category.category_number;
        categories.push(category.clone());

        if !self
            .push_remote(Table::LicenseCategories, &number.to_string(), &category)
            .await
        {
            return false;
        }

        self.commit(
            LICENSE_CATEGORIES_KEY,
            EventKind::LicenseCategoriesUpdated,
            &categories,
            format!("license category added: {number}"),
        );
        true
    }

    /// Apply a partial update to one category. Emits a single
    /// `license_categories_updated` event with the whole refreshed list.
    pub async fn update_license_category(
        &self,
        category_number: u32,
        patch: LicenseCategoryPatch,
    ) -> bool {
        let mut categories = self.get_license_categories();
        let Some(category) = categories
            .iter_mut()
            .find(|c| c.category_number == category_number)
        else {
            return false;
        };
        category.apply(&patch);
        let updated = category.clone();

        if !self
            .push_remote(
                Table::LicenseCategories,
                &category_number.to_string(),
                &updated,
            )
            .await
        {
            return false;
        }

        self.commit(
            LICENSE_CATEGORIES_KEY,
            EventKind::LicenseCategoriesUpdated,
            &categories,
            format!("license category updated: {category_number}"),
        );
        true
    }

    // === contacts ===

    pub fn get_contacts(&self) -> Vec<Contact> {
        self.read_collection(Table::Contacts, CONTACTS_KEY)
    }

    pub async fn add_contact(&self, new: NewContact) -> Option<Contact> {
        if let Err(e) = validation::validate_not_empty(&new.name, "name")
            .and_then(|_| validation::validate_email(&new.email, "email"))
            .and_then(|_| validation::validate_length(&new.message, 1, 5000, "message"))
        {
            warn!(error = %e, "Contact submission rejected");
            return None;
        }

        let contact = Contact::from_submission(new);
        let mut contacts = self.get_contacts();
        contacts.push(contact.clone());

        if !self
            .push_remote(Table::Contacts, &contact.id.to_string(), &contact)
            .await
        {
            return None;
        }

        self.commit(
            CONTACTS_KEY,
            EventKind::ContactsUpdated,
            &contacts,
            format!("contact received: {}", contact.id),
        );
        Some(contact)
    }

    pub async fn update_contact_status(&self, id: uuid::Uuid, status: ContactStatus) -> bool {
        let mut contacts = self.get_contacts();
        let Some(contact) = contacts.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        contact.status = status;
        contact.updated_at = chrono::Utc::now();
        let updated = contact.clone();

        if !self
            .push_remote(Table::Contacts, &updated.id.to_string(), &updated)
            .await
        {
            return false;
        }

        self.commit(
            CONTACTS_KEY,
            EventKind::ContactsUpdated,
            &contacts,
            format!("contact {id} status updated"),
        );
        true
    }

    // === events ===

    pub fn add_event_listener(&self, event: EventKind, listener: Listener) -> ListenerId {
        self.transport.add_event_listener(event, listener)
    }

    pub fn remove_event_listener(&self, event: EventKind, id: ListenerId) {
        self.transport.remove_event_listener(event, id)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Envelope> {
        self.transport.subscribe()
    }

    // === session ===

    pub fn login(&self, password: &str) -> bool {
        self.session.login(password)
    }

    pub fn logout(&self) {
        self.session.logout();
        self.store
            .secure_set(SECURITY_EVENTS_KEY, &self.audit.snapshot());
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn touch_session(&self) {
        self.session.touch()
    }

    // === audit ===

    pub fn security_events(&self) -> Vec<crate::audit::SecurityEvent> {
        self.audit.snapshot()
    }

    /// Manually trigger a security event, e.g. from an HTTP surface.
    pub fn record_security_event(&self, kind: SecurityEventKind, details: String) {
        self.record_audit(kind, details);
    }

    /// Sanity surface used by the health endpoint.
    pub fn health(&self) -> Value {
        json!({
            "store": self.store.data_dir().exists(),
            "gateway": self.gateway.is_some(),
            "authenticated": self.is_authenticated(),
        })
    }
}

impl Drop for DataManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
