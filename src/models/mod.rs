pub mod campaign;
pub mod contact;
pub mod exclusion_list;
pub mod call_attempt;
pub mod survey_response;
pub mod event;
pub mod email_notification;

pub use call_attempt::*;
pub use campaign::*;
pub use contact::*;
pub use email_notification::*;
pub use event::*;
pub use exclusion_list::*;
pub use survey_response::*;
