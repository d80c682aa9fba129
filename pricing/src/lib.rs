//! European Black-Scholes pricing kernel.
//!
//! Pure functions over [`OptionParameters`]: price, the five first-order
//! Greeks, and implied-volatility inversion. No state, no I/O.

use thiserror::Error;

/// Volatility floor accepted by the kernel (1bp).
pub const MIN_VOL: f64 = 1e-4;
/// Volatility ceiling accepted by the kernel (500%).
pub const MAX_VOL: f64 = 5.0;

const SQRT_2PI: f64 = 2.506_628_274_631_000_7;
const D1D2_EPSILON: f64 = 1e-10;

/// Errors the pricing kernel can raise.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// `OptionParameters` failed `is_valid()` or volatility fell outside
    /// `[MIN_VOL, MAX_VOL]`.
    #[error("invalid option parameters: {reason}")]
    InvalidParameters { reason: String },
    /// A non-finite intermediate value, or an iteration that failed to
    /// converge / had zero vega.
    #[error("numeric error: {reason}")]
    NumericError { reason: String },
}

pub type PricingResult<T> = Result<T, PricingError>;

/// Inputs to the Black-Scholes formulae.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionParameters {
    /// Spot price of the underlying. Must be > 0.
    pub spot: f64,
    /// Strike price. Must be > 0.
    pub strike: f64,
    /// Annualized risk-free rate. Must be >= 0.
    pub risk_free_rate: f64,
    /// Annualized volatility. Must be in `[MIN_VOL, MAX_VOL]`.
    pub volatility: f64,
    /// Time to expiry in years. Must be > 0.
    pub time_to_expiry: f64,
    /// `true` for a call, `false` for a put.
    pub is_call: bool,
}

impl OptionParameters {
    /// Field-level validity, independent of the volatility band (checked
    /// separately since it carries its own error message per the spec).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.spot > 0.0
            && self.strike > 0.0
            && self.risk_free_rate >= 0.0
            && self.volatility > 0.0
            && self.time_to_expiry > 0.0
    }

    fn validate(&self) -> PricingResult<()> {
        if !self.is_valid() {
            return Err(PricingError::InvalidParameters {
                reason: "spot, strike, volatility and time_to_expiry must be positive and risk_free_rate non-negative".into(),
            });
        }
        if self.volatility < MIN_VOL || self.volatility > MAX_VOL {
            return Err(PricingError::InvalidParameters {
                reason: format!(
                    "volatility {} outside [{MIN_VOL}, {MAX_VOL}]",
                    self.volatility
                ),
            });
        }
        Ok(())
    }
}

/// First-order option sensitivities. Vega and rho are pre-scaled by 0.01
/// (price change per 1-percentage-point move); theta is reported per year.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Standard normal cumulative distribution function.
#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal probability density function.
#[must_use]
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

fn d1_d2(p: &OptionParameters) -> PricingResult<(f64, f64)> {
    let sqrt_t = p.time_to_expiry.sqrt();
    if sqrt_t < D1D2_EPSILON {
        return Err(PricingError::NumericError {
            reason: "sqrt(time_to_expiry) too close to zero".into(),
        });
    }
    let d1 = ((p.spot / p.strike).ln() + (p.risk_free_rate + 0.5 * p.volatility * p.volatility) * p.time_to_expiry)
        / (p.volatility * sqrt_t);
    let d2 = d1 - p.volatility * sqrt_t;
    if !d1.is_finite() || !d2.is_finite() {
        return Err(PricingError::NumericError {
            reason: "non-finite d1/d2".into(),
        });
    }
    Ok((d1, d2))
}

/// European option price under Black-Scholes (no dividends).
pub fn calculate_price(p: &OptionParameters) -> PricingResult<f64> {
    p.validate()?;
    let (d1, d2) = d1_d2(p)?;
    let discount = (-p.risk_free_rate * p.time_to_expiry).exp();
    let price = if p.is_call {
        p.spot * norm_cdf(d1) - p.strike * discount * norm_cdf(d2)
    } else {
        p.strike * discount * norm_cdf(-d2) - p.spot * norm_cdf(-d1)
    };
    Ok(price.max(0.0))
}

/// First-order Greeks under Black-Scholes.
pub fn calculate_greeks(p: &OptionParameters) -> PricingResult<Greeks> {
    p.validate()?;
    let (d1, d2) = d1_d2(p)?;
    let sqrt_t = p.time_to_expiry.sqrt();
    let discount = (-p.risk_free_rate * p.time_to_expiry).exp();
    let pdf_d1 = norm_pdf(d1);

    let delta = if p.is_call { norm_cdf(d1) } else { norm_cdf(d1) - 1.0 };
    let gamma = pdf_d1 / (p.spot * p.volatility * sqrt_t);
    let theta = -p.spot * p.volatility * pdf_d1 / (2.0 * sqrt_t)
        + if p.is_call {
            -p.risk_free_rate * p.strike * discount * norm_cdf(d2)
        } else {
            p.risk_free_rate * p.strike * discount * norm_cdf(-d2)
        };
    let vega = p.spot * sqrt_t * pdf_d1 * 0.01;
    let rho = if p.is_call {
        p.strike * p.time_to_expiry * discount * norm_cdf(d2) * 0.01
    } else {
        -p.strike * p.time_to_expiry * discount * norm_cdf(-d2) * 0.01
    };

    Ok(Greeks { delta, gamma, theta, vega, rho })
}

/// Implied volatility via Newton-Raphson, Brenner-Subrahmanyam initial guess.
pub fn calculate_implied_volatility(
    params: &OptionParameters,
    target_price: f64,
    tolerance: f64,
    max_iterations: u32,
) -> PricingResult<f64> {
    let initial_guess = (2.0 * std::f64::consts::PI / params.time_to_expiry).sqrt()
        * (target_price / params.spot);
    let mut vol = initial_guess.clamp(MIN_VOL, MAX_VOL);
    let mut iter_params = *params;

    for _ in 0..max_iterations {
        iter_params.volatility = vol;
        let price = calculate_price(&iter_params)?;
        let diff = price - target_price;
        if diff.abs() < tolerance {
            return Ok(vol);
        }

        let vega = calculate_greeks(&iter_params)?.vega;
        if vega.abs() < 1e-10 {
            return Err(PricingError::NumericError {
                reason: "vega too small to continue Newton-Raphson".into(),
            });
        }

        let next_vol = (vol - diff / (vega * 100.0)).clamp(MIN_VOL, MAX_VOL);
        if (next_vol - vol).abs() < tolerance {
            return Ok(next_vol);
        }
        vol = next_vol;
    }

    Err(PricingError::NumericError {
        reason: format!("implied volatility did not converge in {max_iterations} iterations"),
    })
}

/// Default tolerance and iteration bound for [`calculate_implied_volatility`]
/// callers that don't need to override them.
pub const DEFAULT_IV_TOLERANCE: f64 = 1e-5;
pub const DEFAULT_IV_MAX_ITERATIONS: u32 = 100;

/// Mid price of a bid/ask pair.
#[must_use]
pub fn mid(bid: f64, ask: f64) -> f64 {
    (bid + ask) / 2.0
}

/// Bid/ask spread.
#[must_use]
pub fn spread(bid: f64, ask: f64) -> f64 {
    ask - bid
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn atm_call() -> OptionParameters {
        OptionParameters {
            spot: 100.0,
            strike: 100.0,
            risk_free_rate: 0.05,
            volatility: 0.2,
            time_to_expiry: 1.0,
            is_call: true,
        }
    }

    // Scenario S1: at-the-money call/put.
    #[test]
    fn atm_call_price_and_delta() {
        let p = atm_call();
        let price = calculate_price(&p).unwrap();
        assert_relative_eq!(price, 10.4506, epsilon = 1e-3);
        let greeks = calculate_greeks(&p).unwrap();
        assert_relative_eq!(greeks.delta, 0.6368, epsilon = 1e-3);
    }

    #[test]
    fn atm_put_price() {
        let mut p = atm_call();
        p.is_call = false;
        let price = calculate_price(&p).unwrap();
        assert_relative_eq!(price, 5.5735, epsilon = 1e-3);
    }

    // Invariant 1: price is never negative for valid inputs.
    #[test]
    fn price_is_never_negative() {
        for vol in [0.05, 0.2, 1.0, 3.0] {
            for t in [0.01, 0.5, 2.0] {
                let p = OptionParameters { volatility: vol, time_to_expiry: t, ..atm_call() };
                assert!(calculate_price(&p).unwrap() >= 0.0);
                let mut put = p;
                put.is_call = false;
                assert!(calculate_price(&put).unwrap() >= 0.0);
            }
        }
    }

    // Invariant 2: put-call parity.
    #[test]
    fn put_call_parity_holds() {
        let call = atm_call();
        let mut put = call;
        put.is_call = false;
        let call_price = calculate_price(&call).unwrap();
        let put_price = calculate_price(&put).unwrap();
        let parity_rhs = call.spot - call.strike * (-call.risk_free_rate * call.time_to_expiry).exp();
        assert_relative_eq!(call_price - put_price, parity_rhs, epsilon = 1e-6);
    }

    // Invariant 3 / Scenario S2: implied vol round-trip.
    #[test]
    fn implied_volatility_round_trips() {
        let mut p = atm_call();
        p.volatility = 0.35;
        let price = calculate_price(&p).unwrap();
        let recovered = calculate_implied_volatility(&p, price, DEFAULT_IV_TOLERANCE, DEFAULT_IV_MAX_ITERATIONS).unwrap();
        assert_relative_eq!(recovered, 0.35, epsilon = 1e-4);
    }

    #[test]
    fn implied_volatility_round_trips_over_grid() {
        for vol in [0.05, 0.5, 1.0, 2.0] {
            for t in [0.05, 1.0, 5.0] {
                for moneyness in [0.5, 1.0, 2.0] {
                    let p = OptionParameters {
                        spot: 100.0 * moneyness,
                        strike: 100.0,
                        risk_free_rate: 0.03,
                        volatility: vol,
                        time_to_expiry: t,
                        is_call: true,
                    };
                    let price = calculate_price(&p).unwrap();
                    if price < 1e-8 {
                        continue;
                    }
                    let recovered =
                        calculate_implied_volatility(&p, price, DEFAULT_IV_TOLERANCE, DEFAULT_IV_MAX_ITERATIONS);
                    if let Ok(recovered) = recovered {
                        assert_relative_eq!(recovered, vol, epsilon = 5e-3);
                    }
                }
            }
        }
    }

    #[test]
    fn invalid_parameters_rejected() {
        let mut p = atm_call();
        p.spot = -1.0;
        assert!(matches!(calculate_price(&p), Err(PricingError::InvalidParameters { .. })));

        let mut p = atm_call();
        p.volatility = 10.0;
        assert!(matches!(calculate_price(&p), Err(PricingError::InvalidParameters { .. })));
    }

    #[test]
    fn zero_time_to_expiry_is_numeric_error() {
        let mut p = atm_call();
        p.time_to_expiry = 0.0;
        assert!(matches!(calculate_price(&p), Err(PricingError::InvalidParameters { .. })));
    }

    #[test]
    fn mid_and_spread() {
        assert_relative_eq!(mid(1.0, 2.0), 1.5);
        assert_relative_eq!(spread(1.0, 2.0), 1.0);
    }
}
