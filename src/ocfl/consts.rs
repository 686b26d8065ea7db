pub const REPO_NAMASTE_FILE: &str = "0=ocfl_1.0";
pub const OBJECT_NAMASTE_FILE: &str = "0=ocfl_object_1.0";
pub const INVENTORY_FILE: &str = "inventory.json";

pub const DEFAULT_CONTENT_DIR: &str = "content";
