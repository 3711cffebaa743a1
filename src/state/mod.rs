//! Server state: the entity store, link registry and channel actors.

pub mod actor;
pub mod bans;
pub mod channel;
pub mod link;
pub mod matrix;
pub mod modes;
pub mod uid;

pub use bans::{covered, Ban, BanClass};
pub use channel::{split_sigils, ChannelFlags, ChannelModes, Member, MemberModes, Topic};
pub use link::{Link, LinkCaps, LinkId, LinkKind};
pub use matrix::{Condemned, Matrix, ServerInfo, Uid, User, UserAttach};
pub use modes::{ModeOutcome, ModeWriter, Privilege};
pub use uid::UidGenerator;
