mod auth;
mod calculations;
mod health_check;

pub use auth::{get_current_user, login, logout, refresh, register};
pub use calculations::{
    create_calculation, delete_calculation, get_calculation, list_calculations,
    update_calculation,
};
pub use health_check::health_check;
