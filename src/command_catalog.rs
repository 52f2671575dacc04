//! The fixed command catalog shared by every transport. These names and their
//! argument-object field names are the contract the desktop shell and the
//! control plane honor; they must stay stable across versions.

// Process lifecycle.
pub const PROCESS_START: &str = "process_start";
pub const PROCESS_STOP: &str = "process_stop";
pub const PROCESS_RESTART: &str = "process_restart";
pub const PROCESS_STATUS_TEXT: &str = "process_status_text";
pub const ONEBOT_STATUS_TEXT: &str = "onebot_status_text";
pub const SUBS_SUMMARY_TEXT: &str = "subs_summary_text";
pub const CALL_ONEBOT_STATUS_API: &str = "call_onebot_status_api";
pub const CALL_SUBS_SUMMARY_API: &str = "call_subs_summary_api";
pub const HEALTH_CHECK: &str = "health_check";

// Configuration.
pub const READ_CONFIG_FILE: &str = "read_config_file";
pub const WRITE_CONFIG_FILE: &str = "write_config_file";
pub const LIST_CONFIG_BACKUPS: &str = "list_config_backups";
pub const RESTORE_CONFIG_BACKUP: &str = "restore_config_backup";

// Logs and the admin credential that guards the backend's own log panel.
pub const READ_LOGS_TAIL: &str = "read_logs_tail";
pub const CLEAR_LOGS: &str = "clear_logs";
pub const GET_ADMIN_PASSWORD: &str = "get_admin_password";
pub const SET_ADMIN_PASSWORD: &str = "set_admin_password";
pub const RESET_ADMIN_PASSWORD: &str = "reset_admin_password";

// Panel update lifecycle.
pub const UPDATE_CHECK: &str = "update_check";
pub const GET_CURRENT_VERSION: &str = "get_current_version";
pub const DOWNLOAD_FILE: &str = "download_file";
pub const RELAUNCH: &str = "relaunch";

// Managed runtime install and versions.
pub const INSTALL_RUNTIME: &str = "install_runtime";
pub const INSTALLED_VERSION_TEXT: &str = "installed_version_text";
pub const GET_BINARY_VERSION: &str = "get_binary_version";

// Firewall.
pub const CHECK_FIREWALL_RULE: &str = "check_firewall_rule";
pub const ADD_FIREWALL_RULE: &str = "add_firewall_rule";
pub const REMOVE_FIREWALL_RULE: &str = "remove_firewall_rule";

// Openers.
pub const OPEN_FILE: &str = "open_file";
pub const OPEN_FOLDER: &str = "open_folder";
pub const OPEN_URL_IN_BROWSER: &str = "open_url_in_browser";
pub const OPEN_DATA_DIR: &str = "open_data_dir";
pub const OPEN_LOGS_DIRECTORY: &str = "open_logs_directory";

/// Pushed by the backend out-of-band whenever its own update check finds a
/// newer panel version.
pub const BACKGROUND_UPDATE_EVENT: &str = "background-update-available";
