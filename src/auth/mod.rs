//! Identity as seen by this module: users and the sessions that point at them.
//! Issuing sessions (login) belongs to the hosting application.

pub mod session;
pub mod users;
