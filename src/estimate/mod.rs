use crate::autosave::{AutoSave, DraftPayload};
use crate::database::types::Client;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

pub mod totals;
pub mod types;

pub use types::{
    DiscountType, EstimateStatus, LineItem, LineItemInput, Totals, ValidationIssue,
};

/// The central entity. Derived figures (item totals and the totals block) are
/// replaced wholesale on every mutation and never accepted from callers.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub client: Option<Client>,
    pub project_description: String,
    pub items: Vec<LineItem>,
    pub tax_rate: f64,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub totals: Totals,
    pub status: EstimateStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EstimateUpdate {
    pub client: Option<Client>,
    pub project_description: Option<String>,
    pub items: Option<Vec<LineItemInput>>,
    pub tax_rate: Option<f64>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<f64>,
}

impl Estimate {
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            client: None,
            project_description: String::new(),
            items: Vec::new(),
            tax_rate: 0.0,
            discount_type: DiscountType::default(),
            discount_value: 0.0,
            totals: Totals::default(),
            status: EstimateStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn apply_update(&mut self, update: EstimateUpdate) {
        if let Some(client) = update.client {
            self.client = Some(client);
        }
        if let Some(description) = update.project_description {
            self.project_description = description;
        }
        if let Some(items) = update.items {
            self.items = items.into_iter().map(LineItem::from).collect();
        }
        if let Some(tax_rate) = update.tax_rate {
            self.tax_rate = tax_rate;
        }
        if let Some(discount_type) = update.discount_type {
            self.discount_type = discount_type;
        }
        if let Some(discount_value) = update.discount_value {
            self.discount_value = discount_value;
        }
        self.recompute();
    }

    pub fn add_items(&mut self, items: Vec<LineItem>) {
        self.items.extend(items);
        self.recompute();
    }

    pub fn recompute(&mut self) {
        for item in &mut self.items {
            item.recompute_total();
        }
        self.totals = totals::compute(
            &self.items,
            self.discount_type,
            self.discount_value,
            self.tax_rate,
        );
        self.updated_at = Utc::now();
    }

    pub fn validate_for_finalize(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if self.client.is_none() {
            issues.push(ValidationIssue {
                field: "client",
                message: "Select or create a client before finalizing".to_string(),
            });
        }
        if self.items.is_empty() {
            issues.push(ValidationIssue {
                field: "items",
                message: "Add at least one line item before finalizing".to_string(),
            });
        }
        issues
    }

    pub fn finalize(&mut self) -> Result<(), Vec<ValidationIssue>> {
        let issues = self.validate_for_finalize();
        if !issues.is_empty() {
            return Err(issues);
        }
        self.status = EstimateStatus::Finalized;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn client_name(&self) -> Option<String> {
        self.client.as_ref().map(|client| client.name.clone())
    }

    /// Only the fields whose changes matter for persistence; timestamps and
    /// derived totals are left out so recomputation alone never forces a save.
    pub fn comparison_snapshot(&self) -> serde_json::Value {
        json!({
            "client": self.client,
            "project_description": self.project_description,
            "items": self.items,
            "tax_rate": self.tax_rate,
            "discount_type": self.discount_type,
            "discount_value": self.discount_value,
        })
    }

    /// Current storage shape for the drafts table. The normalizer reads this
    /// back (plus the two older shapes still present in storage).
    pub fn to_document(&self) -> serde_json::Value {
        json!({
            "client": self.client,
            "client_name": self.client_name(),
            "project_description": self.project_description,
            "material_costs": { "items": self.items },
            "tax_rate": self.tax_rate,
            "discount_type": self.discount_type,
            "discount_value": self.discount_value,
            "totals": self.totals,
            "status": self.status,
        })
    }

    pub fn draft_payload(&self) -> DraftPayload {
        DraftPayload {
            snapshot: self.comparison_snapshot(),
            document: self.to_document(),
            client_name: self.client_name(),
        }
    }
}

/// An open estimate being edited through the wizard. Mutations go through
/// here so every change recomputes totals and pokes the auto-save task.
pub struct EstimateSession {
    pub estimate: Estimate,
    autosave: AutoSave,
}

impl EstimateSession {
    pub fn open(estimate: Estimate, autosave: AutoSave) -> Self {
        Self { estimate, autosave }
    }

    pub fn apply(&mut self, update: EstimateUpdate) {
        self.estimate.apply_update(update);
        self.autosave.notify(self.estimate.draft_payload());
    }

    pub fn add_items(&mut self, items: Vec<LineItem>) {
        self.estimate.add_items(items);
        self.autosave.notify(self.estimate.draft_payload());
    }
}
