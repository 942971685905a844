pub mod app_state;

pub use app_state::{
    default_data_dir, AppState, Endpoints, LauncherSettings, APP_DIR_NAME, MSA_CLIENT_ID_FALLBACK,
};
