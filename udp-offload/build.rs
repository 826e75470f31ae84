use cfg_aliases::cfg_aliases;

fn main() {
    // Setup cfg aliases
    cfg_aliases! {
        // Platforms
        apple: {
            any(
                target_os = "macos",
                target_os = "ios",
                target_os = "tvos",
                target_os = "visionos"
            )
        },
        // Targets with a vectorized `sendmmsg`
        mmsg: { any(target_os = "linux", target_os = "android") },
    }
}
