use serde::{Deserialize, Serialize};

use crate::domain::{market::GeoPoint, product::ProductId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartRequest {
    pub items: Vec<CartItem>,
    pub user_location: Option<GeoPoint>,
}

impl CartRequest {
    pub fn new(items: Vec<CartItem>, user_location: Option<GeoPoint>) -> Self {
        Self { items, user_location }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::InvalidRequest("cart must contain at least one item".into()));
        }

        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(DomainError::InvalidRequest(format!(
                "quantity for product {} must be at least 1",
                item.product_id.0
            )));
        }

        if let Some(location) = &self.user_location {
            if !location.is_valid() {
                return Err(DomainError::InvalidRequest(
                    "user location must be a valid latitude/longitude pair".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        let mut ids = self.items.iter().map(|item| item.product_id).collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        cart::{CartItem, CartRequest},
        market::GeoPoint,
        product::ProductId,
    };
    use crate::errors::DomainError;

    fn item(id: i64, quantity: u32) -> CartItem {
        CartItem { product_id: ProductId(id), name: format!("product-{id}"), quantity }
    }

    #[test]
    fn empty_cart_is_rejected() {
        let error = CartRequest::new(Vec::new(), None).validate().expect_err("empty cart");
        assert!(matches!(error, DomainError::InvalidRequest(_)));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let error = CartRequest::new(vec![item(1, 1), item(2, 0)], None)
            .validate()
            .expect_err("zero quantity");
        assert!(matches!(error, DomainError::InvalidRequest(ref message) if message.contains('2')));
    }

    #[test]
    fn out_of_range_location_is_rejected() {
        let request = CartRequest::new(vec![item(1, 1)], Some(GeoPoint::new(123.0, 0.0)));
        assert!(request.validate().is_err());
    }

    #[test]
    fn product_ids_are_deduplicated() {
        let request = CartRequest::new(vec![item(3, 1), item(1, 2), item(3, 4)], None);
        assert_eq!(request.product_ids(), vec![ProductId(1), ProductId(3)]);
    }
}
