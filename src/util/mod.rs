mod money_amount;

pub use money_amount::{MoneyAmount, MoneyAmountParseError, format_units};
