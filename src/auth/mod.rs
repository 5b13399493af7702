/// Authentication subsystem.
///
/// Token issuance and verification (dual-secret access/refresh), password
/// hashing, the revocation denylist, and the resolution of bearer tokens to
/// active users.

mod authenticator;
mod claims;
mod jwt;
mod password;
mod revocation;

pub use authenticator::Authenticator;
pub use authenticator::CurrentUser;
pub use authenticator::PgUserDirectory;
pub use authenticator::TokenPair;
pub use authenticator::UserDirectory;
pub use authenticator::UserRecord;
pub use claims::Claims;
pub use claims::TokenType;
pub use jwt::TokenCodec;
pub use password::PasswordHasher;
pub use revocation::InMemoryRevocationStore;
pub use revocation::PgRevocationStore;
pub use revocation::RevocationStore;
