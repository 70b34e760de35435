use crate::database::types::Client;
use crate::estimate::{DiscountType, Estimate, EstimateStatus, LineItem, Totals};
use chrono::Utc;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// The storage shapes that have accumulated in the drafts table over time.
/// Classification is priority-ordered; each variant has its own migration
/// below, and anything unrecognizable degrades to a single editable
/// placeholder rather than a hard failure.
#[derive(Debug)]
pub enum StoredSchema<'a> {
    /// Current shape: items under `material_costs.items`.
    Structured(&'a Value),
    /// Older shape: a flat top-level `items` array.
    Flat(&'a Value),
    /// Oldest shape: line items embedded in an HTML table string.
    HtmlTable(&'a str),
    Unrecognized,
}

pub fn classify(document: &Value) -> StoredSchema<'_> {
    if let Some(items) = document
        .get("material_costs")
        .or_else(|| document.get("materialCosts"))
        .and_then(|costs| costs.get("items"))
    {
        if items.is_array() {
            return StoredSchema::Structured(items);
        }
    }
    if let Some(items) = document.get("items") {
        if items.is_array() {
            return StoredSchema::Flat(items);
        }
    }
    for key in ["items_html", "html", "content"] {
        if let Some(html) = document.get(key).and_then(|v| v.as_str()) {
            if html.contains("<table") {
                return StoredSchema::HtmlTable(html);
            }
        }
    }
    StoredSchema::Unrecognized
}

/// Rebuilds a canonical in-memory estimate from whatever shape the stored
/// record has. Never fails; malformed fields fall back to zeros and missing
/// item data degrades to a placeholder so the editor always has something to
/// show.
pub fn normalize(owner_id: Uuid, document: &Value, known_clients: &[Client]) -> Estimate {
    let items = match classify(document) {
        StoredSchema::Structured(items) | StoredSchema::Flat(items) => items_from_array(items),
        StoredSchema::HtmlTable(html) => items_from_html(html),
        StoredSchema::Unrecognized => {
            debug!("draft has no recognizable item source, synthesizing placeholder");
            Vec::new()
        }
    };
    let items = if items.is_empty() {
        vec![placeholder_item()]
    } else {
        items
    };

    let tax_rate = normalize_tax_rate(coerce_number(field(
        document,
        &["tax_rate", "taxRate", "tax"],
    )));
    let discount_type = discount_type_from(field(document, &["discount_type", "discountType"]));
    let discount_value = coerce_number(field(
        document,
        &["discount_value", "discountValue", "discount"],
    ));
    let project_description = field(document, &["project_description", "projectDescription", "description"])
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut estimate = Estimate {
        id: Uuid::new_v4(),
        owner_id,
        client: resolve_client(document, known_clients),
        project_description,
        items,
        tax_rate,
        discount_type,
        discount_value,
        totals: Totals::default(),
        status: EstimateStatus::Draft,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    estimate.recompute();
    estimate
}

fn placeholder_item() -> LineItem {
    LineItem::new("New item", "", 1.0, 0.0, "unit")
}

fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(key))
}

/// String-or-number coercion with zero fallback; legacy records store
/// numerics either way, sometimes with currency noise.
fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Legacy writers stored percentages as basis points (e.g. 1000 for 10%).
fn normalize_tax_rate(rate: f64) -> f64 {
    if rate > 100.0 {
        rate / 100.0
    } else {
        rate
    }
}

fn discount_type_from(value: Option<&Value>) -> DiscountType {
    match value.and_then(|v| v.as_str()) {
        Some("fixed") | Some("amount") => DiscountType::Fixed,
        _ => DiscountType::Percentage,
    }
}

fn items_from_array(items: &Value) -> Vec<LineItem> {
    items
        .as_array()
        .map(|entries| entries.iter().filter_map(item_from_value).collect())
        .unwrap_or_default()
}

fn item_from_value(entry: &Value) -> Option<LineItem> {
    if !entry.is_object() {
        return None;
    }
    let name = field(entry, &["name", "item", "title"])
        .and_then(|v| v.as_str())
        .unwrap_or("Item")
        .to_string();
    let description = field(entry, &["description", "details"])
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let unit = field(entry, &["unit", "unit_label", "unitLabel"])
        .and_then(|v| v.as_str())
        .unwrap_or("unit")
        .to_string();

    let mut quantity = coerce_number(field(entry, &["quantity", "qty"]));
    let mut unit_price = coerce_number(field(entry, &["unit_price", "unitPrice", "price", "rate"]));
    let stored_total = coerce_number(field(entry, &["total", "amount"]));

    // When qty x price is unusable but a stored total exists, back-fill the
    // factors so the recomputed total still matches the stored figure.
    if quantity * unit_price == 0.0 && stored_total > 0.0 {
        if quantity > 0.0 {
            unit_price = stored_total / quantity;
        } else {
            quantity = 1.0;
            unit_price = stored_total;
        }
    }

    Some(LineItem::new(&name, &description, quantity, unit_price, &unit))
}

/// Cell layouts seen in the wild: 5 columns (name, qty, unit, rate, amount),
/// 4 (name, qty, rate, amount), 3 (name, qty, rate), 2 (name, amount).
fn items_from_html(html: &str) -> Vec<LineItem> {
    let (Ok(row_selector), Ok(cell_selector)) = (Selector::parse("tr"), Selector::parse("td"))
    else {
        return Vec::new();
    };

    let document = Html::parse_fragment(html);
    let mut items = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        let item = match cells.len() {
            n if n >= 5 => LineItem::new(
                &cells[0],
                "",
                coerce_cell(&cells[1]),
                coerce_cell(&cells[3]),
                &cells[2],
            ),
            3 | 4 => {
                LineItem::new(&cells[0], "", coerce_cell(&cells[1]), coerce_cell(&cells[2]), "unit")
            }
            2 => LineItem::new(&cells[0], "", 1.0, coerce_cell(&cells[1]), "unit"),
            _ => continue, // header rows carry <th>, not <td>
        };
        if item.name.is_empty() {
            continue;
        }
        items.push(item);
    }

    items
}

fn coerce_cell(cell: &str) -> f64 {
    coerce_number(Some(&Value::String(cell.to_string())))
}

fn resolve_client(document: &Value, known_clients: &[Client]) -> Option<Client> {
    let embedded = document.get("client");
    let name = embedded
        .and_then(|c| c.get("name"))
        .or_else(|| field(document, &["client_name", "clientName"]))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    if let Some(known) = known_clients
        .iter()
        .find(|client| client.name.trim().eq_ignore_ascii_case(&name))
    {
        return Some(known.clone());
    }

    // No directory match: build a synthetic client from whatever contact
    // fields the record carries.
    let mut client = Client::named(&name);
    client.email = embedded
        .and_then(|c| c.get("email"))
        .or_else(|| field(document, &["client_email", "clientEmail"]))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    client.phone = embedded
        .and_then(|c| c.get("phone"))
        .or_else(|| field(document, &["client_phone", "clientPhone"]))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    client.address = embedded
        .and_then(|c| c.get("address"))
        .or_else(|| field(document, &["client_address", "clientAddress"]))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::{totals, EstimateUpdate, LineItemInput};
    use serde_json::json;

    fn owner() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn test_current_schema_roundtrips() {
        let mut original = Estimate::new(owner());
        original.apply_update(EstimateUpdate {
            client: Some(Client::named("Acme Renovations")),
            project_description: Some("Kitchen remodel".to_string()),
            items: Some(vec![LineItemInput {
                id: None,
                name: "drywall".to_string(),
                description: "5/8 inch".to_string(),
                quantity: 12.0,
                unit_price: 18.5,
                unit: "sheet".to_string(),
            }]),
            tax_rate: Some(8.0),
            discount_type: Some(DiscountType::Percentage),
            discount_value: Some(10.0),
        });

        let directory = vec![Client::named("Acme Renovations")];
        let loaded = normalize(owner(), &original.to_document(), &directory);

        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].name, "drywall");
        assert_eq!(loaded.items[0].total, 222.0);
        assert_eq!(loaded.tax_rate, 8.0);
        assert_eq!(loaded.discount_value, 10.0);
        // Matched against the directory, not synthesized.
        assert_eq!(loaded.client.as_ref().unwrap().id, directory[0].id);
        assert_eq!(loaded.totals, original.totals);
    }

    #[test]
    fn test_flat_schema_with_string_numbers() {
        let record = json!({
            "items": [
                { "name": "paint", "qty": "2", "price": "$45.50" },
                { "name": "labor", "quantity": 3, "rate": 60 }
            ],
            "taxRate": "8",
            "discountType": "fixed",
            "discount": "15"
        });

        let loaded = normalize(owner(), &record, &[]);

        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].total, 91.0);
        assert_eq!(loaded.items[1].total, 180.0);
        assert_eq!(loaded.tax_rate, 8.0);
        assert_eq!(loaded.discount_type, DiscountType::Fixed);
        assert_eq!(loaded.discount_value, 15.0);
    }

    #[test]
    fn test_html_table_schema() {
        let record = json!({
            "client_name": "Jane Mason",
            "items_html": "<table>\
                <tr><th>Item</th><th>Qty</th><th>Unit</th><th>Rate</th><th>Amount</th></tr>\
                <tr><td>Tiles</td><td>30</td><td>m2</td><td>12.50</td><td>375.00</td></tr>\
                <tr><td>Grout</td><td>4</td><td>bag</td><td>9.00</td><td>36.00</td></tr>\
            </table>"
        });

        let loaded = normalize(owner(), &record, &[]);

        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.items[0].name, "Tiles");
        assert_eq!(loaded.items[0].unit, "m2");
        assert_eq!(loaded.items[0].total, 375.0);
        assert_eq!(loaded.items[1].quantity, 4.0);
        assert_eq!(loaded.client.as_ref().unwrap().name, "Jane Mason");
    }

    #[test]
    fn test_unrecognized_record_gets_one_placeholder() {
        let loaded = normalize(owner(), &json!({ "note": "???" }), &[]);

        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].quantity, 1.0);
        assert_eq!(loaded.items[0].unit_price, 0.0);
    }

    #[test]
    fn test_items_key_with_wrong_type_degrades_to_placeholder() {
        let loaded = normalize(owner(), &json!({ "items": "not an array" }), &[]);

        assert_eq!(loaded.items.len(), 1);
    }

    #[test]
    fn test_basis_point_tax_rate_is_corrected() {
        let record = json!({ "items": [], "tax_rate": 1000 });
        let loaded = normalize(owner(), &record, &[]);

        assert_eq!(loaded.tax_rate, 10.0);
    }

    #[test]
    fn test_stored_total_backfills_missing_factors() {
        let record = json!({ "items": [{ "name": "flat fee", "total": 120 }] });
        let loaded = normalize(owner(), &record, &[]);

        assert_eq!(loaded.items[0].quantity, 1.0);
        assert_eq!(loaded.items[0].unit_price, 120.0);
        assert_eq!(loaded.items[0].total, 120.0);
    }

    #[test]
    fn test_zero_stored_total_is_recomputed() {
        let record = json!({ "items": [{ "name": "studs", "qty": 10, "price": 3.5, "total": 0 }] });
        let loaded = normalize(owner(), &record, &[]);

        assert_eq!(loaded.items[0].total, 35.0);
    }

    #[test]
    fn test_synthetic_client_from_embedded_contact_fields() {
        let record = json!({
            "items": [],
            "client_name": "Walk-in Customer",
            "client_email": "walkin@example.com",
            "client_phone": "555-0142"
        });

        let loaded = normalize(owner(), &record, &[]);
        let client = loaded.client.unwrap();

        assert_eq!(client.name, "Walk-in Customer");
        assert_eq!(client.email.as_deref(), Some("walkin@example.com"));
        assert_eq!(client.phone.as_deref(), Some("555-0142"));
    }

    #[test]
    fn test_normalized_totals_satisfy_invariant() {
        let record = json!({
            "items": [{ "name": "paint", "qty": "2", "price": "50" }],
            "tax_rate": 800,
            "discount_value": 10
        });
        let loaded = normalize(owner(), &record, &[]);

        let recomputed = totals::compute(
            &loaded.items,
            loaded.discount_type,
            loaded.discount_value,
            loaded.tax_rate,
        );
        assert_eq!(loaded.totals, recomputed);
        assert_eq!(loaded.tax_rate, 8.0);
    }
}
