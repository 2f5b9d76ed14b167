/// Router Module Index
///
/// Routes are grouped by how much the caller must prove before a handler runs. The
/// authentication layer is attached per group in `create_router`, so a route can only
/// end up unprotected by being placed in `public`.

/// No token required or inspected: health, login, registration.
pub mod public;

/// Token optional. An identity, when present, widens what the catalog shows; an
/// invalid token is still rejected.
pub mod catalog;

/// Token required. Ownership and role rules are applied inside each operation.
pub mod authenticated;

/// Token required; the operations themselves are admin-only and decide so through
/// the authorization policy.
pub mod admin;
