fn main() {
    // Tell cargo to recompile when these compile-time env vars change.
    // Without this, option_env!() values get cached and won't update.
    println!("cargo:rerun-if-env-changed=CONSOLE_STORAGE_KEY");
    println!("cargo:rerun-if-env-changed=CONSOLE_API_BASE_URL");
}
