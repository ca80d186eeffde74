mod matcher;
mod normalize;

pub use matcher::{extract, MatchResult, FAILED_LOGIN_MARKER, SUCCESS_MARKER};
pub use normalize::normalize;
