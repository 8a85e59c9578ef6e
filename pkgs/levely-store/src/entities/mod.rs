//! Sea-ORM entities for levely-store

pub mod conversations;
pub mod messages;
pub mod profiles;

pub use conversations::Entity as Conversation;
pub use messages::Entity as Message;
pub use profiles::Entity as Profile;
