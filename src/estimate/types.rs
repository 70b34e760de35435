use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl Default for DiscountType {
    fn default() -> Self {
        DiscountType::Percentage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Draft,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Always quantity x unit_price; recomputed on every mutation.
    pub total: f64,
}

pub fn default_unit() -> String {
    "unit".to_string()
}

impl LineItem {
    pub fn new(name: &str, description: &str, quantity: f64, unit_price: f64, unit: &str) -> Self {
        let mut item = Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            quantity,
            unit_price,
            unit: unit.to_string(),
            total: 0.0,
        };
        item.recompute_total();
        item
    }

    pub fn recompute_total(&mut self) {
        self.total = super::totals::round_cents(self.quantity * self.unit_price);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

/// Incoming line item on a PATCH; the derived total is never accepted from
/// the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl From<LineItemInput> for LineItem {
    fn from(input: LineItemInput) -> Self {
        let mut item = LineItem {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            name: input.name,
            description: input.description,
            quantity: input.quantity,
            unit_price: input.unit_price,
            unit: input.unit,
            total: 0.0,
        };
        item.recompute_total();
        item
    }
}
