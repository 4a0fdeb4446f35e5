// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use rowgate::tools::{Operation, TableAllowList, ToolRegistry};
use serde_json::{json, Map, Value};

/// Structured tool arguments, close enough to valid that most inputs
/// get past the schema gate and exercise the allow-list and filter gates.
#[derive(Debug, Arbitrary)]
struct ToolArgsInput {
    tool: u8,
    table: String,
    filters: Vec<(String, Option<String>)>,
    values: Vec<(String, i64)>,
    columns: Option<Vec<String>>,
    order_by: Option<String>,
    limit: Option<i64>,
}

impl ToolArgsInput {
    fn arguments(&self, select: bool) -> Value {
        let filters: Map<String, Value> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().map_or(Value::Null, Value::String)))
            .collect();
        let values: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        if !select {
            return json!({ "table": self.table, "where": filters, "values": values });
        }
        let mut args = json!({ "table": self.table, "where": filters });
        if let Some(columns) = &self.columns {
            args["columns"] = json!(columns);
        }
        if let Some(order_by) = &self.order_by {
            args["orderBy"] = json!(order_by);
        }
        if let Some(limit) = self.limit {
            args["limit"] = json!(limit);
        }
        args
    }
}

fn check_gates(registry: &ToolRegistry, name: &str, args: &Value) {
    if let Ok(op) = registry.prepare(name, args) {
        // Nothing outside the allow-list, and no unbounded mutation, gets through.
        assert_eq!(op.table(), "packages");
        match op {
            Operation::Update { filters, .. } | Operation::Delete { filters, .. } => {
                assert!(!filters.is_empty());
            }
            Operation::Select { query, .. } => {
                assert!(query.limit.map_or(true, |l| (1..=200).contains(&l)));
            }
            Operation::Insert { values, .. } => assert!(!values.is_empty()),
        }
    }
}

fuzz_target!(|data: &[u8]| {
    let registry = ToolRegistry::new(TableAllowList::new(["packages"]).unwrap());
    let tools: Vec<&'static str> = registry.tools().iter().map(|t| t.name).collect();

    let mut unstructured = Unstructured::new(data);
    if let Ok(input) = ToolArgsInput::arbitrary(&mut unstructured) {
        let name = tools[usize::from(input.tool) % tools.len()];
        let args = input.arguments(name == "supabase_select");
        check_gates(&registry, name, &args);
    }

    // Raw JSON goes through every tool as well.
    if let Ok(args) = serde_json::from_slice::<Value>(data) {
        for name in &tools {
            check_gates(&registry, name, &args);
        }
    }
});
