pub mod greeks;
pub mod histogram;
