use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cart, CartLine, Paise};

/// The lines of a checked-out cart that belong to one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorGroup {
    pub vendor_id: String,
    pub lines: Vec<CartLine>,
    pub subtotal: Paise,
}

/// A frozen copy of a cart, taken at checkout. This is the only input the order splitter needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: i64,
    pub court_id: String,
    pub customer_id: String,
    pub lines: Vec<CartLine>,
    /// Vendors in the order they first appear in the cart
    pub vendor_groups: Vec<VendorGroup>,
    pub total: Paise,
    pub taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn is_multi_vendor(&self) -> bool {
        self.vendor_groups.len() > 1
    }
}

impl From<Cart> for CartSnapshot {
    fn from(cart: Cart) -> Self {
        let mut vendor_groups: Vec<VendorGroup> = Vec::new();
        for line in &cart.lines {
            match vendor_groups.iter_mut().find(|g| g.vendor_id == line.vendor_id) {
                Some(group) => {
                    group.subtotal += line.subtotal;
                    group.lines.push(line.clone());
                },
                None => vendor_groups.push(VendorGroup {
                    vendor_id: line.vendor_id.clone(),
                    lines: vec![line.clone()],
                    subtotal: line.subtotal,
                }),
            }
        }
        Self {
            cart_id: cart.id,
            court_id: cart.court_id,
            customer_id: cart.customer_id,
            total: cart.total,
            lines: cart.lines,
            vendor_groups,
            taken_at: cart.updated_at,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::CartStatus;

    fn line(id: i64, vendor: &str, price: i64, qty: i64) -> CartLine {
        CartLine {
            id,
            cart_id: 1,
            menu_item_id: format!("item-{id}"),
            vendor_id: vendor.into(),
            name: format!("Item {id}"),
            unit_price: price.into(),
            quantity: qty,
            subtotal: (price * qty).into(),
            customizations: None,
        }
    }

    #[test]
    fn groups_lines_by_vendor_in_cart_order() {
        let now = Utc::now();
        let cart = Cart {
            id: 1,
            court_id: "c1".into(),
            customer_id: "asha".into(),
            status: CartStatus::CheckedOut,
            total: 25_000.into(),
            created_at: now,
            updated_at: now,
            lines: vec![line(1, "b", 5_000, 1), line(2, "a", 10_000, 1), line(3, "a", 10_000, 1)],
        };
        let snapshot = CartSnapshot::from(cart);
        assert!(snapshot.is_multi_vendor());
        let vendors: Vec<&str> = snapshot.vendor_groups.iter().map(|g| g.vendor_id.as_str()).collect();
        assert_eq!(vendors, vec!["b", "a"]);
        assert_eq!(snapshot.vendor_groups[1].subtotal, Paise::from(20_000));
        assert_eq!(snapshot.vendor_groups[1].lines.len(), 2);
        let sum: Paise = snapshot.vendor_groups.iter().map(|g| g.subtotal).sum();
        assert_eq!(sum, snapshot.total);
    }
}
