#![no_main]

use libfuzzer_sys::fuzz_target;
use trustpin_lib::Fingerprint;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Whatever parses must print back to the same pin in both text forms.
    if let Ok(fp) = Fingerprint::parse(text) {
        assert_eq!(Fingerprint::parse(&fp.to_string()).ok(), Some(fp));
        assert_eq!(Fingerprint::parse(&fp.to_hex()).ok(), Some(fp));
    }
});
