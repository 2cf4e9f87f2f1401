//! Fee-unit accounting for block budgets.
//!
//! Every transaction declares a fixed unit cost up front; the block
//! assembler and the executor both meter those costs against the block's
//! unit budget so that a built block and its re-execution agree.

/// Returned when a charge would exceed the meter's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("units exceeded: limit {limit}, requested {requested}")]
pub struct UnitsExceeded {
    pub limit: u64,
    pub requested: u64,
}

#[derive(Debug, Clone)]
pub struct UnitMeter {
    limit: u64,
    consumed: u64,
}

impl UnitMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    /// Consume units. On error the consumed count is unchanged.
    pub fn consume(&mut self, amount: u64) -> Result<(), UnitsExceeded> {
        match self.consumed.checked_add(amount) {
            Some(v) if v <= self.limit => {
                self.consumed = v;
                Ok(())
            }
            _ => Err(UnitsExceeded {
                limit: self.limit,
                requested: self.consumed.saturating_add(amount),
            }),
        }
    }

    /// Whether `amount` more units would still fit.
    pub fn fits(&self, amount: u64) -> bool {
        self.consumed
            .checked_add(amount)
            .is_some_and(|v| v <= self.limit)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.limit
    }
}
