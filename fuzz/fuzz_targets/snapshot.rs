#![no_main]

use branchwatch::watch::{BranchWatch, CandidateStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut store = CandidateStore::new();
    let mut reader = data;
    if store.load(&mut reader).is_ok() {
        // Whatever loads must save again
        let mut out = Vec::new();
        store.save(&mut out).unwrap();
    }
});
