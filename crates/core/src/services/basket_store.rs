use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::basket::{Basket, UserBalance};

/// Everything the dashboard keeps about the connected wallet's baskets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasketState {
    pub user_baskets: Vec<Basket>,

    /// Id of the basket open in the detail view.
    pub selected_basket: Option<String>,

    pub user_balances: Vec<UserBalance>,
}

/// Every way the basket state may change.
#[derive(Debug, Clone, PartialEq)]
pub enum BasketAction {
    /// Replace all baskets (after reading them from the contract).
    SetUserBaskets(Vec<Basket>),
    /// Optimistic insert right after a mint.
    AddBasket(Basket),
    /// Replace a basket with a recomputed copy carrying the same id.
    UpdateBasketPerformance(Basket),
    SelectBasket(Option<String>),
    SetUserBalances(Vec<UserBalance>),
    /// Wallet disconnected.
    Clear,
}

/// State container with a single update entry point.
#[derive(Debug, Clone, Default)]
pub struct BasketStore {
    state: BasketState,
}

impl BasketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: BasketState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &BasketState {
        &self.state
    }

    pub fn baskets(&self) -> &[Basket] {
        &self.state.user_baskets
    }

    pub fn basket(&self, id: &str) -> Option<&Basket> {
        self.state.user_baskets.iter().find(|b| b.id == id)
    }

    pub fn selected_basket(&self) -> Option<&Basket> {
        self.state
            .selected_basket
            .as_deref()
            .and_then(|id| self.basket(id))
    }

    /// Apply one action. Invalid actions leave the state untouched.
    pub fn dispatch(&mut self, action: BasketAction) -> Result<(), CoreError> {
        match action {
            BasketAction::SetUserBaskets(baskets) => {
                if let Some(selected) = &self.state.selected_basket {
                    if !baskets.iter().any(|b| &b.id == selected) {
                        self.state.selected_basket = None;
                    }
                }
                self.state.user_baskets = baskets;
            }
            BasketAction::AddBasket(basket) => {
                if self.basket(&basket.id).is_some() {
                    return Err(CoreError::ValidationError(format!(
                        "Basket {} already exists",
                        basket.id
                    )));
                }
                self.state.user_baskets.push(basket);
            }
            BasketAction::UpdateBasketPerformance(updated) => {
                let slot = self
                    .state
                    .user_baskets
                    .iter_mut()
                    .find(|b| b.id == updated.id)
                    .ok_or_else(|| CoreError::BasketNotFound(updated.id.clone()))?;
                *slot = updated;
            }
            BasketAction::SelectBasket(Some(id)) => {
                if self.basket(&id).is_none() {
                    return Err(CoreError::BasketNotFound(id));
                }
                self.state.selected_basket = Some(id);
            }
            BasketAction::SelectBasket(None) => {
                self.state.selected_basket = None;
            }
            BasketAction::SetUserBalances(balances) => {
                self.state.user_balances = balances;
            }
            BasketAction::Clear => {
                self.state = BasketState::default();
            }
        }
        Ok(())
    }

    /// Serialize the state for the caller's key-value persistence.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(&self.state)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize basket state: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(Self::from_state(serde_json::from_str(json)?))
    }
}
