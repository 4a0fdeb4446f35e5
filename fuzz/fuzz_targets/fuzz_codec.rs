// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use rowgate::mcp::codec::LineCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Small limit so the discard path is reached too.
    let mut codec = LineCodec::with_max_length(128);
    let mut buffer = BytesMut::from(data);

    while let Ok(Some(_)) = codec.decode(&mut buffer) {}
    while let Ok(Some(_)) = codec.decode_eof(&mut buffer) {}
    assert!(buffer.is_empty());
});
