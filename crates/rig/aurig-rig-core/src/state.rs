//! AU state: canonical values and balances.

use hashbrown::HashMap;

use crate::ids::AuId;

/// Current AU values in [0, 1] and per-AU balances in [-1, 1].
#[derive(Clone, Debug, Default)]
pub struct AuState {
    values: HashMap<AuId, f32>,
    balances: HashMap<AuId, f32>,
}

impl AuState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn value(&self, au: AuId) -> f32 {
        self.values.get(&au).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn balance(&self, au: AuId) -> f32 {
        self.balances.get(&au).copied().unwrap_or(0.0)
    }

    pub(crate) fn set_value(&mut self, au: AuId, value: f32) {
        let v = sanitize(value).clamp(0.0, 1.0);
        if v == 0.0 {
            self.values.remove(&au);
        } else {
            self.values.insert(au, v);
        }
    }

    pub(crate) fn set_balance(&mut self, au: AuId, balance: f32) {
        let b = sanitize(balance).clamp(-1.0, 1.0);
        if b == 0.0 {
            self.balances.remove(&au);
        } else {
            self.balances.insert(au, b);
        }
    }

    /// Non-zero AU values.
    pub fn active(&self) -> impl Iterator<Item = (AuId, f32)> + '_ {
        self.values.iter().map(|(a, v)| (*a, *v))
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.balances.clear();
    }
}

/// NaN collapses to 0; infinities survive so that clamping saturates them.
#[inline]
pub(crate) fn sanitize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}
