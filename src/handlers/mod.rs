pub mod admin_handlers;
pub mod page_handlers;
pub mod verification_handlers;

pub use admin_handlers::{
    delete_user_handler, list_users_handler, toggle_admin_handler, user_detail_handler,
};
pub use page_handlers::{dashboard_handler, index_handler, render_error_page};
pub use verification_handlers::{
    request_verification_handler, verify_account_page, verify_email_handler,
};
