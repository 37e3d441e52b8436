use basalt_contracts::{BASALT_INTERFACE_SCHEMA_VERSION, BASALT_PROGRAM_SCHEMA_VERSION};
use basalt_runner::InterfaceDoc;
use basalt_vm::Program;
use serde_json::json;

pub fn program(builtins: &[&str], data: serde_json::Value) -> Program {
    Program::from_json(
        &json!({
            "schema_version": BASALT_PROGRAM_SCHEMA_VERSION,
            "builtins": builtins,
            "data": data
        })
        .to_string(),
    )
    .expect("program document")
}

pub fn interface(funcs: serde_json::Value) -> InterfaceDoc {
    serde_json::from_value(json!({
        "schema_version": BASALT_INTERFACE_SCHEMA_VERSION,
        "funcs": funcs
    }))
    .expect("interface document")
}
