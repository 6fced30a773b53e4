pub mod cmd_elements;
pub mod cmd_field;
pub mod cmd_get;
pub mod cmd_list;
pub mod cmd_script;
pub mod cmd_set;
pub mod common;
