//! # Draft Orders
//!
//! The in-progress orders ("tickets") an operator keeps open at the stall.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Draft Order Store                                    │
//! │                                                                         │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐                             │
//! │   │ Pedido 1 │  │ Pedido 2 │  │ Pedido 3 │   ◄── create()              │
//! │   │ (active) │  │          │  │          │                             │
//! │   └────┬─────┘  └──────────┘  └──────────┘                             │
//! │        │                                                                │
//! │        ├── add_item / add_manual_item / adjust_quantity                 │
//! │        ├── set_payment_method                                           │
//! │        ├── clear()   ── after a successful submit or offline queueing   │
//! │        └── delete()  ── the last draft is emptied, never removed        │
//! │                                                                         │
//! │   Drafts are local only. Nothing here touches the store.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Clamping
//! Catalog lines remember the stock seen when the product was last added.
//! Quantities are clamped to `[0, stock]`; manual lines only to
//! `[0, MAX_ITEM_QUANTITY]`. The authoritative check happens again at
//! submission time against the live store.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{OrderLineItem, PaymentMethod, Product};
use crate::validation::{validate_item_name, validate_quantity, validate_unit_price};
use crate::{DRAFT_LABEL_PREFIX, MAX_ITEM_QUANTITY};

// =============================================================================
// Draft Order
// =============================================================================

/// One open ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftOrder {
    pub id: String,
    pub label: String,
    pub items: Vec<OrderLineItem>,
    pub payment_method: PaymentMethod,
}

impl DraftOrder {
    fn new(id: String, label: String) -> Self {
        DraftOrder {
            id,
            label,
            items: Vec::new(),
            payment_method: PaymentMethod::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Σ(unit_price × quantity)
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(OrderLineItem::line_total).sum()
    }

    /// No tax is modeled, so the total is the subtotal.
    pub fn total(&self) -> Money {
        self.subtotal()
    }

    /// Number in the label ("Pedido 4" → 4), if any.
    fn label_number(&self) -> Option<u64> {
        let digits: String = self
            .label
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

/// Totals summary for a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal: Money,
    pub total: Money,
}

impl From<&DraftOrder> for DraftTotals {
    fn from(draft: &DraftOrder) -> Self {
        DraftTotals {
            item_count: draft.item_count(),
            total_quantity: draft.total_quantity(),
            subtotal: draft.subtotal(),
            total: draft.total(),
        }
    }
}

// =============================================================================
// Order Notes
// =============================================================================

/// Builds the note written on a confirmed sale.
///
/// ## Format
/// ```text
/// cash / transfer : "2x Led rojo 100 - 1x Flete"
/// pending         : "PENDIENTE - 2x Led rojo 100 - 1x Flete"
/// pending, empty  : "PENDIENTE - Sin detalle"
/// ```
pub fn order_notes(items: &[OrderLineItem], method: PaymentMethod) -> Option<String> {
    let summary = items
        .iter()
        .map(|item| format!("{}x {}", item.quantity, item.name))
        .collect::<Vec<_>>()
        .join(" - ");

    if method.is_pending() {
        let detail = if summary.is_empty() { "Sin detalle" } else { summary.as_str() };
        Some(format!("{}{}", crate::PENDING_NOTE_PREFIX, detail))
    } else if summary.is_empty() {
        None
    } else {
        Some(summary)
    }
}

/// Notes for a pending sale being settled.
///
/// An explicit note wins; otherwise the `PENDIENTE -` marker is stripped from
/// the existing notes (case-insensitive); otherwise the existing notes are
/// kept trimmed.
pub fn settled_notes(explicit: Option<&str>, existing: Option<&str>) -> Option<String> {
    if let Some(note) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
        return Some(note.to_string());
    }

    let existing = existing?;
    let stripped = strip_pending_marker(existing).trim();
    if !stripped.is_empty() {
        return Some(stripped.to_string());
    }

    let trimmed = existing.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn strip_pending_marker(notes: &str) -> &str {
    const MARKER: &str = "pendiente";

    let head = notes.get(..MARKER.len());
    if !head.is_some_and(|h| h.eq_ignore_ascii_case(MARKER)) {
        return notes;
    }
    let rest = notes[MARKER.len()..].trim_start();
    match rest.strip_prefix('-') {
        Some(after) => after.trim_start(),
        None => notes,
    }
}

// =============================================================================
// Draft Order Store
// =============================================================================

/// All open drafts plus the one currently being edited.
///
/// ## Invariants
/// - At least one draft always exists
/// - `active` always names an existing draft
/// - Lines are unique by id; a line never has quantity 0
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOrderStore {
    drafts: Vec<DraftOrder>,
    active: String,
    next_id: u64,
}

impl DraftOrderStore {
    /// A store holding "Pedido 1", active, paying cash.
    pub fn new() -> Self {
        DraftOrderStore {
            drafts: vec![DraftOrder::new("1".to_string(), format!("{}1", DRAFT_LABEL_PREFIX))],
            active: "1".to_string(),
            next_id: 2,
        }
    }

    /// Creates an empty draft labelled one past the highest number in use.
    ///
    /// The new draft is not activated.
    ///
    /// ## Returns
    /// The new draft's id.
    pub fn create(&mut self) -> String {
        let next_number = self
            .drafts
            .iter()
            .filter_map(DraftOrder::label_number)
            .max()
            .unwrap_or(0)
            + 1;

        let id = self.next_id.to_string();
        self.next_id += 1;

        self.drafts.push(DraftOrder::new(
            id.clone(),
            format!("{}{}", DRAFT_LABEL_PREFIX, next_number),
        ));
        id
    }

    pub fn set_active(&mut self, draft_id: &str) -> CoreResult<()> {
        self.get(draft_id)?;
        self.active = draft_id.to_string();
        Ok(())
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn active(&self) -> &DraftOrder {
        // `active` always names an existing draft and drafts is never empty
        self.drafts
            .iter()
            .find(|d| d.id == self.active)
            .unwrap_or(&self.drafts[0])
    }

    pub fn drafts(&self) -> &[DraftOrder] {
        &self.drafts
    }

    pub fn get(&self, draft_id: &str) -> CoreResult<&DraftOrder> {
        self.drafts
            .iter()
            .find(|d| d.id == draft_id)
            .ok_or_else(|| CoreError::DraftNotFound(draft_id.to_string()))
    }

    fn get_mut(&mut self, draft_id: &str) -> CoreResult<&mut DraftOrder> {
        self.drafts
            .iter_mut()
            .find(|d| d.id == draft_id)
            .ok_or_else(|| CoreError::DraftNotFound(draft_id.to_string()))
    }

    /// Adds `quantity` units of a catalog product.
    ///
    /// ## Behavior
    /// - Already in the draft: quantity grows, but never past the product's
    ///   current stock. If it would, the line is left unchanged and
    ///   `InsufficientStock` is returned.
    /// - Not in the draft: inserted, rejected with `OutOfStock` when stock is 0.
    ///
    /// The line's remembered stock is refreshed from `product` either way.
    pub fn add_item(&mut self, draft_id: &str, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;
        let draft = self.get_mut(draft_id)?;

        if let Some(line) = draft
            .items
            .iter_mut()
            .find(|i| !i.is_manual && i.product_id == Some(product.id))
        {
            let requested = line.quantity + quantity;
            if requested > product.stock {
                return Err(CoreError::InsufficientStock {
                    product: product.name.clone(),
                    available: product.stock,
                    requested,
                });
            }
            validate_quantity(requested)?;
            line.quantity = requested;
            line.stock = Some(product.stock);
            return Ok(());
        }

        if product.stock <= 0 {
            return Err(CoreError::OutOfStock {
                product: product.name.clone(),
            });
        }
        if quantity > product.stock {
            return Err(CoreError::InsufficientStock {
                product: product.name.clone(),
                available: product.stock,
                requested: quantity,
            });
        }

        let mut line = OrderLineItem::from_product(product);
        line.quantity = quantity;
        draft.items.push(line);
        Ok(())
    }

    /// Appends an ad-hoc line that is not backed by stock.
    ///
    /// ## Returns
    /// The new line's id.
    pub fn add_manual_item(
        &mut self,
        draft_id: &str,
        name: &str,
        unit_price: Money,
        quantity: i64,
    ) -> CoreResult<String> {
        let name = validate_item_name(name)?;
        validate_unit_price(unit_price.units())?;
        validate_quantity(quantity)?;

        let draft = self.get_mut(draft_id)?;
        let line = OrderLineItem::manual(name, unit_price, quantity);
        let id = line.id.clone();
        draft.items.push(line);
        Ok(id)
    }

    /// Moves a line's quantity by `delta`, clamped to `[0, stock]`.
    ///
    /// A line that reaches 0 is removed.
    ///
    /// ## Returns
    /// The resulting quantity (0 when the line was removed).
    pub fn adjust_quantity(&mut self, draft_id: &str, item_id: &str, delta: i64) -> CoreResult<i64> {
        let draft = self.get_mut(draft_id)?;
        let index = draft
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::LineItemNotFound {
                draft_id: draft_id.to_string(),
                item_id: item_id.to_string(),
            })?;

        let line = &mut draft.items[index];
        let ceiling = match line.stock {
            Some(stock) if !line.is_manual => stock.min(MAX_ITEM_QUANTITY),
            _ => MAX_ITEM_QUANTITY,
        };
        let quantity = line.quantity.saturating_add(delta).clamp(0, ceiling.max(0));

        if quantity == 0 {
            draft.items.remove(index);
        } else {
            line.quantity = quantity;
        }
        Ok(quantity)
    }

    pub fn set_payment_method(&mut self, draft_id: &str, method: PaymentMethod) -> CoreResult<()> {
        self.get_mut(draft_id)?.payment_method = method;
        Ok(())
    }

    /// Empties the item list. The payment method is kept.
    pub fn clear(&mut self, draft_id: &str) -> CoreResult<()> {
        self.get_mut(draft_id)?.items.clear();
        Ok(())
    }

    /// Removes a draft.
    ///
    /// The only remaining draft is reset to empty instead. Deleting the
    /// active draft activates the first remaining one.
    pub fn delete(&mut self, draft_id: &str) -> CoreResult<()> {
        self.get(draft_id)?;

        if self.drafts.len() == 1 {
            let draft = &mut self.drafts[0];
            draft.items.clear();
            draft.payment_method = PaymentMethod::default();
            return Ok(());
        }

        self.drafts.retain(|d| d.id != draft_id);
        if self.active == draft_id {
            self.active = self.drafts[0].id.clone();
        }
        Ok(())
    }

    pub fn totals(&self, draft_id: &str) -> CoreResult<DraftTotals> {
        self.get(draft_id).map(DraftTotals::from)
    }
}

impl Default for DraftOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, name: &str, price: i64, stock: i64) -> Product {
        Product {
            id,
            name: name.to_string(),
            price,
            category: None,
            stock,
            is_active: true,
        }
    }

    #[test]
    fn test_new_store_has_one_active_draft() {
        let store = DraftOrderStore::new();
        assert_eq!(store.drafts().len(), 1);
        assert_eq!(store.active().label, "Pedido 1");
        assert_eq!(store.active().payment_method, PaymentMethod::Cash);
    }

    #[test]
    fn test_create_numbers_past_highest_label() {
        let mut store = DraftOrderStore::new();
        let second = store.create();
        let third = store.create();
        assert_eq!(store.get(&third).unwrap().label, "Pedido 3");

        store.delete(&second).unwrap();
        let fourth = store.create();
        assert_eq!(store.get(&fourth).unwrap().label, "Pedido 4");
        // not activated
        assert_eq!(store.active_id(), "1");
    }

    #[test]
    fn test_set_active_rejects_unknown() {
        let mut store = DraftOrderStore::new();
        assert!(matches!(store.set_active("nope"), Err(CoreError::DraftNotFound(_))));
    }

    #[test]
    fn test_scenario_a_totals() {
        let mut store = DraftOrderStore::new();
        let led = product(1, "Led rojo 100", 2500, 5);

        store.add_item("1", &led, 1).unwrap();
        store.add_item("1", &led, 1).unwrap();
        store
            .add_manual_item("1", "Flete", Money::from_units(3000), 1)
            .unwrap();

        let totals = store.totals("1").unwrap();
        assert_eq!(totals.item_count, 2);
        assert_eq!(totals.total_quantity, 3);
        assert_eq!(totals.subtotal.units(), 8000);
        assert_eq!(totals.total.units(), 8000);
    }

    #[test]
    fn test_scenario_c_add_past_stock_is_rejected() {
        let mut store = DraftOrderStore::new();
        let led = product(1, "Led rojo 100", 2500, 3);
        store.add_item("1", &led, 3).unwrap();

        let err = store.add_item("1", &led, 1).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 3, requested: 4, .. }
        ));
        assert_eq!(store.active().items[0].quantity, 3);
    }

    #[test]
    fn test_out_of_stock_product_cannot_be_added() {
        let mut store = DraftOrderStore::new();
        let err = store.add_item("1", &product(2, "Guirnalda", 900, 0), 1).unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { .. }));
        assert!(store.active().is_empty());
    }

    #[test]
    fn test_adjust_quantity_clamps_and_removes() {
        let mut store = DraftOrderStore::new();
        let led = product(1, "Led rojo 100", 2500, 3);
        store.add_item("1", &led, 1).unwrap();

        assert_eq!(store.adjust_quantity("1", "1", 10).unwrap(), 3);
        assert_eq!(store.adjust_quantity("1", "1", -1).unwrap(), 2);
        assert_eq!(store.adjust_quantity("1", "1", -5).unwrap(), 0);
        assert!(store.active().is_empty());
    }

    #[test]
    fn test_manual_lines_are_not_stock_clamped() {
        let mut store = DraftOrderStore::new();
        let id = store
            .add_manual_item("1", "Flete", Money::from_units(3000), 1)
            .unwrap();
        assert_eq!(store.adjust_quantity("1", &id, 40).unwrap(), 41);
    }

    #[test]
    fn test_manual_item_validation() {
        let mut store = DraftOrderStore::new();
        assert!(store.add_manual_item("1", " ", Money::from_units(100), 1).is_err());
        assert!(store.add_manual_item("1", "Flete", Money::zero(), 1).is_err());
        assert!(store.add_manual_item("1", "Flete", Money::from_units(100), 0).is_err());
        assert!(store
            .add_manual_item("1", "Flete", Money::from_units(crate::MAX_UNIT_PRICE + 1), 1)
            .is_err());
        assert!(store.active().is_empty());
    }

    #[test]
    fn test_largest_manual_line_totals_without_overflow() {
        let mut store = DraftOrderStore::new();
        let price = Money::from_units(crate::MAX_UNIT_PRICE);
        let id = store.add_manual_item("1", "Stand", price, 1).unwrap();
        store.add_manual_item("1", "Stand 2", price, 1).unwrap();

        assert_eq!(store.adjust_quantity("1", &id, i64::MAX).unwrap(), MAX_ITEM_QUANTITY);
        let totals = store.totals("1").unwrap();
        assert_eq!(totals.total.units(), crate::MAX_UNIT_PRICE * (MAX_ITEM_QUANTITY + 1));
    }

    #[test]
    fn test_clear_keeps_payment_method() {
        let mut store = DraftOrderStore::new();
        store.add_item("1", &product(1, "Led", 100, 2), 1).unwrap();
        store.set_payment_method("1", PaymentMethod::Transfer).unwrap();
        store.clear("1").unwrap();
        assert!(store.active().is_empty());
        assert_eq!(store.active().payment_method, PaymentMethod::Transfer);
    }

    #[test]
    fn test_delete_last_draft_empties_it() {
        let mut store = DraftOrderStore::new();
        store.add_item("1", &product(1, "Led", 100, 2), 1).unwrap();
        store.delete("1").unwrap();
        assert_eq!(store.drafts().len(), 1);
        assert!(store.active().is_empty());
    }

    #[test]
    fn test_delete_active_moves_to_first_remaining() {
        let mut store = DraftOrderStore::new();
        let second = store.create();
        store.set_active(&second).unwrap();
        store.delete(&second).unwrap();
        assert_eq!(store.active_id(), "1");

        let third = store.create();
        store.delete("1").unwrap();
        assert_eq!(store.active_id(), third);
    }

    #[test]
    fn test_order_notes() {
        let items = vec![
            {
                let mut l = OrderLineItem::from_product(&product(1, "Led rojo 100", 2500, 5));
                l.quantity = 2;
                l
            },
            OrderLineItem::manual("Flete", Money::from_units(3000), 1),
        ];
        assert_eq!(
            order_notes(&items, PaymentMethod::Cash).as_deref(),
            Some("2x Led rojo 100 - 1x Flete")
        );
        assert_eq!(
            order_notes(&items, PaymentMethod::Pending).as_deref(),
            Some("PENDIENTE - 2x Led rojo 100 - 1x Flete")
        );
        assert_eq!(
            order_notes(&[], PaymentMethod::Pending).as_deref(),
            Some("PENDIENTE - Sin detalle")
        );
        assert_eq!(order_notes(&[], PaymentMethod::Cash), None);
    }

    #[test]
    fn test_settled_notes() {
        assert_eq!(
            settled_notes(Some(" pagó con vuelto "), Some("PENDIENTE - 1x Led")).as_deref(),
            Some("pagó con vuelto")
        );
        assert_eq!(
            settled_notes(None, Some("pendiente-1x Led")).as_deref(),
            Some("1x Led")
        );
        assert_eq!(
            settled_notes(None, Some("PENDIENTE - ")).as_deref(),
            Some("PENDIENTE -")
        );
        assert_eq!(settled_notes(None, Some("  cliente fiel ")).as_deref(), Some("cliente fiel"));
        assert_eq!(settled_notes(None, None), None);
    }
}
