//! Store products and lucky-spin items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ArenaError, ProductId, Result, SpinItemId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub is_active: bool,
}

impl Product {
    #[must_use]
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.price <= Decimal::ZERO {
            return Err(ArenaError::InvalidAmount(self.price));
        }
        Ok(())
    }
}

/// What a spin item pays out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SpinPrize {
    /// Coins credited straight to the balance.
    Coins(Decimal),
    /// A physical/digital item fulfilled through a pending order.
    Product { name: String },
    /// "Better luck next time".
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinItem {
    pub id: SpinItemId,
    pub label: String,
    /// Relative weight. Not required to sum to 100.
    pub probability: f64,
    pub prize: SpinPrize,
    pub is_active: bool,
}

impl SpinItem {
    #[must_use]
    pub fn new(label: impl Into<String>, probability: f64, prize: SpinPrize) -> Self {
        Self {
            id: SpinItemId::new(),
            label: label.into(),
            probability,
            prize,
            is_active: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.probability.is_finite() || self.probability < 0.0 {
            return Err(ArenaError::InvalidSpinItem {
                reason: format!(
                    "{}: weight {} must be finite and >= 0",
                    self.label, self.probability
                ),
            });
        }
        if let SpinPrize::Coins(amount) = &self.prize
            && *amount <= Decimal::ZERO
        {
            return Err(ArenaError::InvalidSpinItem {
                reason: format!("{}: coin prize {amount} must be > 0", self.label),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_weight_rejected() {
        let item = SpinItem::new("bad", -1.0, SpinPrize::Nothing);
        assert!(item.validate().is_err());
        let item = SpinItem::new("nan", f64::NAN, SpinPrize::Nothing);
        assert!(item.validate().is_err());
    }

    #[test]
    fn zero_coin_prize_rejected() {
        let item = SpinItem::new("zero", 5.0, SpinPrize::Coins(Decimal::ZERO));
        assert!(item.validate().is_err());
        let item = SpinItem::new("ten", 5.0, SpinPrize::Coins(Decimal::TEN));
        assert!(item.validate().is_ok());
    }

    #[test]
    fn free_product_rejected() {
        let product = Product::new("Skin", Decimal::ZERO);
        assert!(matches!(product.validate(), Err(ArenaError::InvalidAmount(_))));
    }

    #[test]
    fn spin_prize_serde_roundtrip() {
        let prize = SpinPrize::Product {
            name: "Headset".into(),
        };
        let json = serde_json::to_string(&prize).unwrap();
        let back: SpinPrize = serde_json::from_str(&json).unwrap();
        assert_eq!(prize, back);
    }
}
