//! Database models.

pub mod api_token;
pub mod collection;
pub mod content;
pub mod form;
pub mod media;
pub mod plugin;
pub mod system_log;
pub mod user;

pub use api_token::ApiToken;
pub use collection::CollectionRow;
pub use content::{Content, ContentVersion, NewContent, WorkflowEntry};
pub use form::{Form, FormSubmission, NewForm, NewSubmission};
pub use media::{Media, NewMedia};
pub use plugin::{PluginActivity, PluginAsset, PluginHook, PluginRecord, PluginRoute};
pub use system_log::{LogConfigRow, SystemLog};
pub use user::{NewUser, User};
