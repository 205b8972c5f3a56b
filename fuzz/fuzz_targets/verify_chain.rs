#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;
use trustpin_lib::{Fingerprint, PolicyOptions, TrustConfig, TrustContext};

fn context() -> &'static TrustContext {
    static CTX: OnceLock<TrustContext> = OnceLock::new();
    CTX.get_or_init(|| {
        let ctx = TrustContext::new(TrustConfig {
            disable_embedded_ca: true,
            disable_system_ca: true,
            base_dir: None,
        });
        ctx.pins().add_global_fingerprint(Fingerprint::of_der(b"fuzz"));
        ctx
    })
}

fuzz_target!(|data: &[u8]| {
    // The first byte picks how many bytes go to each presented certificate.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let size = usize::from(split).max(1) * 16;
    let chain: Vec<Vec<u8>> = rest.chunks(size).map(<[u8]>::to_vec).collect();

    // Arbitrary chains must be rejected or accepted, never panic.
    let settings = context()
        .peer_verification(&PolicyOptions::default())
        .expect("static policy composes");
    if let Some(verifier) = settings.verifier {
        let _ = verifier.evaluate(&chain);
    }
    let _ = trustpin_lib::parse_pem_chain(rest);
});
