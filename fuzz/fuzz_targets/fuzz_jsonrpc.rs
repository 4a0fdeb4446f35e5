// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowgate::mcp::{Dispatcher, Outcome};
use rowgate::store::MemoryStore;
use rowgate::tools::{TableAllowList, ToolRegistry};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

fn dispatcher() -> &'static Dispatcher {
    static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
    DISPATCHER.get_or_init(|| {
        let registry = ToolRegistry::new(TableAllowList::new(["packages"]).unwrap());
        Dispatcher::new(registry, Arc::new(MemoryStore::new()), Duration::from_secs(1))
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(message) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    // Any JSON value must produce a well-formed outcome, never a panic.
    match dispatcher().dispatch(message) {
        Outcome::Reply(resp) => {
            assert!(resp.result.is_some() != resp.error.is_some());
        }
        Outcome::Deferred { .. } | Outcome::Silent => {}
    }
});
