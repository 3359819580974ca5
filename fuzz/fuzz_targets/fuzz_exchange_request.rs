#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = serde_json::from_slice::<turnwise::exchange::ExchangeRequest>(data) {
        let _ = turnwise::components::merge_config(None, &request.parameters);
    }
});
