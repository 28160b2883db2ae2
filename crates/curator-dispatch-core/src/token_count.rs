use std::ops::{Add, Sub};

/// Which dimensions of a [`TokenCount`] count against the tokens-per-minute
/// bucket.
///
/// `Total` and `InputOnly` compare against a single bucket; `Separated`
/// compares input and output against two independent buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenLimitStrategy {
    /// `input + output` share one TPM bucket.
    #[default]
    Total,
    /// Only `input` counts against the TPM bucket; `output` is ignored.
    InputOnly,
    /// `input` and `output` each have their own TPM bucket.
    Separated,
}

/// A conservative (input, output) token pair.
///
/// Addition and subtraction are field-wise; subtraction saturates at zero so
/// that crediting back more than was reserved never underflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCount {
    pub input: u64,
    pub output: u64,
}

impl TokenCount {
    pub const ZERO: TokenCount = TokenCount { input: 0, output: 0 };

    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    /// Total tokens under the `Total` strategy.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }

    /// Whether `self` fits within `budget` under `strategy`.
    pub fn fits_within(&self, budget: &TokenCount, strategy: TokenLimitStrategy) -> bool {
        match strategy {
            TokenLimitStrategy::Total => self.total() <= budget.total(),
            TokenLimitStrategy::InputOnly => self.input <= budget.input,
            TokenLimitStrategy::Separated => self.input <= budget.input && self.output <= budget.output,
        }
    }

    /// Element-wise saturating subtraction.
    pub fn saturating_sub(&self, other: &TokenCount) -> TokenCount {
        TokenCount {
            input: self.input.saturating_sub(other.input),
            output: self.output.saturating_sub(other.output),
        }
    }
}

impl Add for TokenCount {
    type Output = TokenCount;

    fn add(self, rhs: Self) -> Self::Output {
        TokenCount {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
        }
    }
}

impl Sub for TokenCount {
    type Output = TokenCount;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_sub_never_underflows() {
        let a = TokenCount::new(5, 5);
        let b = TokenCount::new(10, 1);
        let result = a - b;
        assert_eq!(result, TokenCount::new(0, 4));
    }

    #[test]
    fn fits_within_total_sums_dimensions() {
        let estimate = TokenCount::new(300, 300);
        let budget = TokenCount::new(1000, 0);
        assert!(estimate.fits_within(&budget, TokenLimitStrategy::Total));

        let too_big = TokenCount::new(600, 600);
        assert!(!too_big.fits_within(&budget, TokenLimitStrategy::Total));
    }

    #[test]
    fn fits_within_input_only_ignores_output() {
        let estimate = TokenCount::new(100, 100_000);
        let budget = TokenCount::new(200, 0);
        assert!(estimate.fits_within(&budget, TokenLimitStrategy::InputOnly));
    }

    #[test]
    fn fits_within_separated_checks_both_dimensions() {
        let estimate = TokenCount::new(100, 900);
        let budget = TokenCount::new(200, 800);
        assert!(!estimate.fits_within(&budget, TokenLimitStrategy::Separated));

        let budget_wide_enough = TokenCount::new(200, 1000);
        assert!(estimate.fits_within(&budget_wide_enough, TokenLimitStrategy::Separated));
    }

    proptest::proptest! {
        #[test]
        fn add_then_sub_is_identity_when_no_saturation(
            a_in in 0u64..1_000_000, a_out in 0u64..1_000_000,
            b_in in 0u64..1_000_000, b_out in 0u64..1_000_000,
        ) {
            let a = TokenCount::new(a_in, a_out);
            let b = TokenCount::new(b_in, b_out);
            let sum = a + b;
            let back = sum - b;
            prop_assert_eq!(back, a);
        }

        #[test]
        fn sub_never_produces_negative_fields(
            a_in in 0u64..1_000, a_out in 0u64..1_000,
            b_in in 0u64..2_000, b_out in 0u64..2_000,
        ) {
            let a = TokenCount::new(a_in, a_out);
            let b = TokenCount::new(b_in, b_out);
            let result = a - b;
            prop_assert!(result.input <= a.input);
            prop_assert!(result.output <= a.output);
        }
    }
}
