fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Deployment pipelines may pin the commit without shipping a .git directory
    println!("cargo:rerun-if-env-changed=BOT_GIT_HASH");
    if let Ok(hash) = std::env::var("BOT_GIT_HASH") {
        println!("cargo:rustc-env=BOT_GIT_HASH={}", hash);
    }
}
