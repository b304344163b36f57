use crate::server::config::AppConfig;
use crate::server::{load_config, validate_config};
use std::path::Path;

pub async fn run() -> anyhow::Result<()> {
    println!("🩺 Shellgate Doctor\n");

    print!("Loading configuration... ");
    let config = match load_config() {
        Ok(config) => {
            println!("✅ Loaded");
            config
        }
        Err(e) => {
            println!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    let mut all_ok = true;
    all_ok &= check_validation(&config);
    all_ok &= check_credentials(&config);
    all_ok &= check_shell(&config);
    all_ok &= check_working_directory(&config);

    println!();
    if all_ok {
        println!("✅ All checks passed! Ready to run Shellgate.");
    } else {
        println!("⚠️  Some checks failed. Please fix the issues above.");
        std::process::exit(1);
    }

    Ok(())
}

fn check_validation(config: &AppConfig) -> bool {
    print!("Validating settings... ");
    match validate_config(config) {
        Ok(()) => {
            println!("✅ OK");
            true
        }
        Err(e) => {
            println!("❌ {}", e);
            false
        }
    }
}

fn check_credentials(config: &AppConfig) -> bool {
    print!("Checking password hash... ");
    match config.auth.password_hash.as_deref() {
        Some(hash) if shellgate_core::is_bcrypt_hash(hash) => {
            println!("✅ bcrypt");
            true
        }
        Some(_) => {
            println!("⚠️  Not a bcrypt hash; every login will fail");
            true
        }
        None => {
            println!("⚠️  Not set (SHELL_HASHWORD); only guest mode is usable");
            true
        }
    }
}

fn check_shell(config: &AppConfig) -> bool {
    print!("Checking shell... ");
    let shell = Path::new(&config.executor.shell);
    if shell.is_file() {
        println!("✅ {}", shell.display());
        true
    } else {
        println!("❌ {} not found", shell.display());
        false
    }
}

fn check_working_directory(config: &AppConfig) -> bool {
    print!("Checking working directory... ");
    let dir = config.executor.initial_directory();
    if dir.is_dir() {
        println!("✅ {}", dir.display());
        true
    } else {
        println!("❌ {} is not a directory", dir.display());
        false
    }
}
