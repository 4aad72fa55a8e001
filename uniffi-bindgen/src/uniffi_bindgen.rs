//! Generates foreign-language bindings for the wallet bridge libraries.

fn main() {
    uniffi::uniffi_bindgen_main();
}
