//! Secondary index: exchange order id -> order id
//!
//! Every insert, update and eviction of an order goes through
//! [`ExchangeIdIndex::reindex`] or [`ExchangeIdIndex::unlink`], so the index
//! always holds exactly the current `exchange_order_id` of each stored order.

use rustc_hash::FxHashMap;

use crate::core_types::OrderId;

#[derive(Debug, Default)]
pub struct ExchangeIdIndex {
    by_exchange_id: FxHashMap<String, OrderId>,
}

impl ExchangeIdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `order_id` from `old` to `new` exchange id
    ///
    /// The old mapping is only removed if it still points at `order_id`.
    pub fn reindex(&mut self, order_id: &str, old: Option<&str>, new: Option<&str>) {
        if old == new {
            if let Some(id) = new {
                self.by_exchange_id
                    .insert(id.to_string(), order_id.to_string());
            }
            return;
        }
        if let Some(old_id) = old {
            self.unlink(order_id, old_id);
        }
        if let Some(new_id) = new {
            self.by_exchange_id
                .insert(new_id.to_string(), order_id.to_string());
        }
    }

    /// Remove `exchange_id` if it maps to `order_id`
    pub fn unlink(&mut self, order_id: &str, exchange_id: &str) {
        if self
            .by_exchange_id
            .get(exchange_id)
            .is_some_and(|owner| owner == order_id)
        {
            self.by_exchange_id.remove(exchange_id);
        }
    }

    #[inline]
    pub fn get(&self, exchange_id: &str) -> Option<&OrderId> {
        self.by_exchange_id.get(exchange_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_exchange_id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_exchange_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_exchange_id.clear();
    }
}
