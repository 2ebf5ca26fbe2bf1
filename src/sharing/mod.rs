/// Share-code access control
///
/// An owner mints one share code per child, a second user redeems it into an
/// access grant, and the visibility resolver turns ownership and grants into
/// the `isShared` / `isReadOnly` flags reported on every child.

pub mod code;
pub mod grants;
pub mod redeem;
pub mod share_codes;
pub mod visibility;

pub use code::{generate_code, normalize_code, ALPHABET, CODE_LENGTH};
pub use grants::{AccessGrant, AccessGrantManager};
pub use redeem::RedemptionService;
pub use share_codes::{ShareCode, ShareCodeManager};
pub use visibility::{Visibility, VisibilityResolver};
