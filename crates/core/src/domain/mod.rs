pub mod agent;
pub mod api_key;
pub mod thread;
pub mod widget;

use uuid::Uuid;

pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
