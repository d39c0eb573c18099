#![no_main]
use combctl_core::orion::{decode, decode_request, read_from_stream};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode(data, None);
    if let Some((&id, rest)) = data.split_first() {
        let _ = decode(rest, Some(id));
    }

    // Whatever parses as a request must re-encode to something that parses the same.
    if let Ok(request) = decode_request(data) {
        let again = decode_request(&request.to_bytes()).expect("re-encoded request decodes");
        assert_eq!(again, request);
    }

    let mut bytes = data.iter().copied();
    let _ = read_from_stream(|| bytes.next());
});
