//! Line-item merge planning.
//!
//! Planning is pure: given the items of the source (guest) cart and of the
//! destination (user) cart it decides, per source item, whether the item is
//! combined into an existing destination line or re-parented onto the
//! destination cart. The store applies the plan inside one transaction.

use std::collections::HashMap;

use gallery_core::{CartItemId, DomainResult};

use crate::model::{CartItem, Quantity, VariationKey};

/// One storage mutation of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStep {
    /// Set `target`'s quantity to `quantity`, then delete `source`.
    ///
    /// The target keeps its own price snapshot.
    Combine {
        source: CartItemId,
        target: CartItemId,
        quantity: Quantity,
    },
    /// Move the item (same id, same snapshot) onto the destination cart.
    Reparent { item: CartItemId },
}

/// Ordered list of steps reconciling a source cart into a destination cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePlan {
    steps: Vec<MergeStep>,
}

impl MergePlan {
    pub fn steps(&self) -> &[MergeStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn combined(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, MergeStep::Combine { .. }))
            .count()
    }

    pub fn reparented(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, MergeStep::Reparent { .. }))
            .count()
    }
}

/// Plan the merge of `source` items into `destination` items.
///
/// Source items are visited in ascending id order so that the same inputs
/// always produce the same plan. Quantities of lines sharing a variation key
/// are summed; destination lines keep their price snapshot.
pub fn plan_merge(source: &[CartItem], destination: &[CartItem]) -> DomainResult<MergePlan> {
    let mut lines: HashMap<&VariationKey, (CartItemId, Quantity)> = destination
        .iter()
        .map(|item| (&item.key, (item.id, item.quantity)))
        .collect();

    let mut ordered: Vec<&CartItem> = source.iter().collect();
    ordered.sort_by_key(|item| item.id);

    let mut steps = Vec::with_capacity(ordered.len());
    for item in ordered {
        match lines.get_mut(&item.key) {
            Some((target, quantity)) => {
                *quantity = quantity.checked_add(item.quantity)?;
                steps.push(MergeStep::Combine {
                    source: item.id,
                    target: *target,
                    quantity: *quantity,
                });
            }
            None => {
                lines.insert(&item.key, (item.id, item.quantity));
                steps.push(MergeStep::Reparent { item: item.id });
            }
        }
    }

    Ok(MergePlan { steps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Money, PriceSnapshot};
    use chrono::{TimeZone, Utc};
    use gallery_core::{CartId, DomainError};
    use proptest::prelude::*;

    fn cart_id(raw: i64) -> CartId {
        CartId::from_raw(raw)
    }

    fn item(id: i64, cart: i64, artwork: &str, frame: &str, qty: i64, cents: i64) -> CartItem {
        let at = Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap();
        CartItem {
            id: CartItemId::from_raw(id),
            cart_id: cart_id(cart),
            key: VariationKey::new(artwork, "print", frame, "M").unwrap(),
            quantity: Quantity::new(qty).unwrap(),
            price: PriceSnapshot::new(Money::from_minor(cents), None, None).unwrap(),
            created_at: at,
            updated_at: at,
        }
    }

    /// Apply a plan in memory the way the store does.
    fn apply(plan: &MergePlan, source: &[CartItem], destination: &[CartItem], dest: i64) -> Vec<CartItem> {
        let mut result: Vec<CartItem> = destination.to_vec();
        let mut pending: Vec<CartItem> = source.to_vec();
        for step in plan.steps() {
            match step {
                MergeStep::Combine { source, target, quantity } => {
                    let line = result.iter_mut().find(|i| i.id == *target).unwrap();
                    line.quantity = *quantity;
                    pending.retain(|i| i.id != *source);
                }
                MergeStep::Reparent { item } => {
                    let idx = pending.iter().position(|i| i.id == *item).unwrap();
                    let mut moved = pending.remove(idx);
                    moved.cart_id = cart_id(dest);
                    result.push(moved);
                }
            }
        }
        assert!(pending.is_empty(), "every source item must be handled");
        result.sort_by_key(|i| i.id);
        result
    }

    #[test]
    fn matching_line_is_combined_and_keeps_destination_price() {
        let source = vec![item(1, 1, "A1", "black", 1, 2500)];
        let destination = vec![item(7, 2, "A1", "black", 2, 2000)];

        let plan = plan_merge(&source, &destination).unwrap();
        assert_eq!(
            plan.steps(),
            &[MergeStep::Combine {
                source: CartItemId::from_raw(1),
                target: CartItemId::from_raw(7),
                quantity: Quantity::new(3).unwrap(),
            }]
        );

        let merged = apply(&plan, &source, &destination, 2);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].quantity.get(), 3);
        assert_eq!(merged[0].price.unit_price, Some(Money::from_minor(2000)));
    }

    #[test]
    fn disjoint_lines_are_reparented_with_their_own_id() {
        let source = vec![item(1, 1, "A1", "black", 1, 2000)];
        let destination = vec![item(2, 2, "A2", "black", 1, 2000)];

        let plan = plan_merge(&source, &destination).unwrap();
        assert_eq!(plan.steps(), &[MergeStep::Reparent { item: CartItemId::from_raw(1) }]);

        let merged = apply(&plan, &source, &destination, 2);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|i| i.cart_id == cart_id(2)));
    }

    #[test]
    fn frame_difference_prevents_combining() {
        let source = vec![item(1, 1, "A1", "white", 1, 2000)];
        let destination = vec![item(2, 2, "A1", "black", 1, 2000)];

        let plan = plan_merge(&source, &destination).unwrap();
        assert_eq!(plan.reparented(), 1);
        assert_eq!(plan.combined(), 0);
    }

    #[test]
    fn empty_source_yields_empty_plan() {
        let destination = vec![item(2, 2, "A1", "black", 1, 2000)];
        assert!(plan_merge(&[], &destination).unwrap().is_empty());
    }

    #[test]
    fn source_items_are_visited_in_id_order() {
        let source = vec![
            item(9, 1, "A3", "black", 1, 100),
            item(3, 1, "A2", "black", 1, 100),
        ];
        let plan = plan_merge(&source, &[]).unwrap();
        assert_eq!(
            plan.steps(),
            &[
                MergeStep::Reparent { item: CartItemId::from_raw(3) },
                MergeStep::Reparent { item: CartItemId::from_raw(9) },
            ]
        );
    }

    #[test]
    fn overflowing_quantities_fail_the_plan() {
        let source = vec![item(1, 1, "A1", "black", i64::from(i32::MAX), 100)];
        let destination = vec![item(2, 2, "A1", "black", 1, 100)];
        assert!(matches!(
            plan_merge(&source, &destination),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    fn arb_lines() -> impl Strategy<Value = Vec<(u8, u8, i64)>> {
        prop::collection::vec((0u8..6, 0u8..2, 1i64..50), 0..8)
    }

    fn build(lines: &[(u8, u8, i64)], first_id: i64, cart: i64) -> Vec<CartItem> {
        let mut seen = std::collections::HashSet::new();
        lines
            .iter()
            .filter(|(artwork, frame, _)| seen.insert((*artwork, *frame)))
            .enumerate()
            .map(|(idx, (artwork, frame, qty))| {
                let frame = if *frame == 0 { "black" } else { "white" };
                item(first_id + idx as i64, cart, &format!("A{artwork}"), frame, *qty, 1000)
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: merging n source lines into m destination lines sharing k
        /// keys leaves n + m - k lines and conserves total quantity.
        #[test]
        fn merge_conserves_lines_and_quantity(
            source_lines in arb_lines(),
            dest_lines in arb_lines(),
        ) {
            let source = build(&source_lines, 1, 1);
            let destination = build(&dest_lines, 100, 2);

            let overlap = source
                .iter()
                .filter(|s| destination.iter().any(|d| d.key == s.key))
                .count();

            let plan = plan_merge(&source, &destination).unwrap();
            let merged = apply(&plan, &source, &destination, 2);

            prop_assert_eq!(merged.len(), source.len() + destination.len() - overlap);

            let total = |items: &[CartItem]| items.iter().map(|i| i64::from(i.quantity.get())).sum::<i64>();
            prop_assert_eq!(total(&merged), total(&source) + total(&destination));

            for line in &merged {
                let expected: i64 = source
                    .iter()
                    .chain(destination.iter())
                    .filter(|i| i.key == line.key)
                    .map(|i| i64::from(i.quantity.get()))
                    .sum();
                prop_assert_eq!(i64::from(line.quantity.get()), expected);
            }
        }

        /// Property: the plan does not depend on the order items were loaded in.
        #[test]
        fn plan_is_deterministic(source_lines in arb_lines(), dest_lines in arb_lines()) {
            let source = build(&source_lines, 1, 1);
            let destination = build(&dest_lines, 100, 2);
            let mut reversed = source.clone();
            reversed.reverse();

            prop_assert_eq!(
                plan_merge(&source, &destination).unwrap(),
                plan_merge(&reversed, &destination).unwrap()
            );
        }
    }
}
