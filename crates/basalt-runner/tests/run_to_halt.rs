use basalt_runner::{find_entry, Runner, RunnerConfig};
use basalt_vm::{BuiltinId, ExecutionFault, Value};
use serde_json::json;

mod support;

fn plain_interface(params: Vec<&str>, returns: Vec<&str>) -> serde_json::Value {
    json!([{
        "name": "demo::demo::main",
        "entry_point": 0,
        "params": params,
        "returns": returns
    }])
}

#[test]
fn entry_ret_reaches_the_halt_sentinel() {
    let program = support::program(&[], json!([{ "op": "ret" }]));
    let interface = support::interface(plain_interface(vec![], vec![]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let halted = active.run().unwrap();
    assert_eq!(halted.steps(), 1);
    assert_eq!(halted.padded_steps(), 1);
}

#[test]
fn program_writes_through_the_output_pointer() {
    // Stack is [output, return fp, halt]; the output base sits at [fp - 3].
    let program = support::program(
        &["output"],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 42 },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 0,
              "src": { "reg": "ap", "off": 0 } },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(
        vec!["OutputBuiltin"],
        vec!["Output", "PanicResult"],
    ));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let output = active.builtin_base(BuiltinId::Output).unwrap();

    let halted = active.run().unwrap();
    assert_eq!(halted.steps(), 3);
    assert_eq!(halted.memory().read(output).unwrap(), Value::Word(42));

    let stats = halted.builtin_stats().to_vec();
    let output_stats = stats.iter().find(|s| s.name == "output").unwrap();
    assert_eq!(output_stats.used_cells, 1);
}

#[test]
fn bitwise_instances_validate_at_finalization() {
    // Stack is [bitwise, return fp, halt]; the bitwise base sits at [fp - 3].
    let program = support::program(
        &["bitwise"],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 12 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 1 }, "imm": 10 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 2 }, "imm": 8 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 3 }, "imm": 14 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 4 }, "imm": 6 },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 0,
              "src": { "reg": "ap", "off": 0 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 1,
              "src": { "reg": "ap", "off": 1 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 2,
              "src": { "reg": "ap", "off": 2 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 3,
              "src": { "reg": "ap", "off": 3 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 4,
              "src": { "reg": "ap", "off": 4 } },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(vec!["BitwiseBuiltin"], vec!["Unit"]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let halted = active.run().unwrap();

    let stats = halted.builtin_stats();
    let bitwise = stats.iter().find(|s| s.name == "bitwise").unwrap();
    assert_eq!(bitwise.instances, 1);
    assert_eq!(bitwise.used_cells, 5);
}

#[test]
fn wrong_bitwise_output_faults_the_run() {
    let program = support::program(
        &["bitwise"],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 12 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 1 }, "imm": 10 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 2 }, "imm": 9 },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 0,
              "src": { "reg": "ap", "off": 0 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 1,
              "src": { "reg": "ap", "off": 1 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 2,
              "src": { "reg": "ap", "off": 2 } },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 4,
              "src": { "reg": "ap", "off": 0 } },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(vec!["BitwiseBuiltin"], vec!["Unit"]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let err = active.run().unwrap_err();
    assert!(matches!(err, ExecutionFault::Builtin(_)));
}

#[test]
fn step_limit_guards_liveness() {
    let program = support::program(&[], json!([{ "op": "jmp", "target": 0 }]));
    let interface = support::interface(plain_interface(vec![], vec![]));
    let entry = find_entry(&interface, "main").unwrap();
    let config = RunnerConfig {
        max_steps: 16,
        ..RunnerConfig::default()
    };
    let active = Runner::new(program, config).unwrap().start(entry).unwrap();
    let err = active.run().unwrap_err();
    assert!(matches!(err, ExecutionFault::StepLimit { limit: 16 }));
}

#[test]
fn conflicting_writes_fault_the_run() {
    let program = support::program(
        &[],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 1 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 2 },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(vec![], vec![]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let err = active.run().unwrap_err();
    assert!(matches!(err, ExecutionFault::Memory(_)));
}

#[test]
fn trace_pads_to_the_next_power_of_two() {
    let program = support::program(
        &[],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 1 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 1 }, "imm": 2 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 2 }, "imm": 3 },
            { "op": "store_imm", "dst": { "reg": "ap", "off": 3 }, "imm": 4 },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(vec![], vec![]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program.clone(), RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let halted = active.run().unwrap();
    assert_eq!(halted.steps(), 5);
    assert_eq!(halted.padded_steps(), 8);
    assert_eq!(halted.trace().len(), 8);
    assert_eq!(halted.trace()[7], halted.trace()[4]);

    let config = RunnerConfig {
        disable_trace_padding: true,
        ..RunnerConfig::default()
    };
    let active = Runner::new(program, config).unwrap().start(entry).unwrap();
    let halted = active.run().unwrap();
    assert_eq!(halted.steps(), 5);
    assert_eq!(halted.padded_steps(), 5);
    assert_eq!(halted.trace().len(), 5);
}

#[test]
fn gas_segment_backs_the_fuel_argument() {
    // Stack is [gas, return fp, halt]; the gas base sits at [fp - 3].
    let program = support::program(
        &[],
        json!([
            { "op": "store_imm", "dst": { "reg": "ap", "off": 0 }, "imm": 1000 },
            { "op": "store_via", "ptr": { "reg": "fp", "off": -3 }, "index": 0,
              "src": { "reg": "ap", "off": 0 } },
            { "op": "ret" }
        ]),
    );
    let interface = support::interface(plain_interface(vec!["GasBuiltin"], vec!["Gas"]));
    let entry = find_entry(&interface, "main").unwrap();
    let active = Runner::new(program, RunnerConfig::default())
        .unwrap()
        .start(entry)
        .unwrap();
    let gas_base = match active.initial_stack()[0] {
        Value::Addr(addr) => addr,
        other => panic!("expected an address, got {other:?}"),
    };
    let halted = active.run().unwrap();
    assert_eq!(halted.memory().read(gas_base).unwrap(), Value::Word(1000));
}
