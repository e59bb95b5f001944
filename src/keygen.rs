use crate::archive::create_new_file;
use crate::cli::KeygenArgs;
use crate::error::Result;
use crate::keys::{PrivateKey, SymmetricKey};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

pub fn keygen(args: KeygenArgs) -> Result<()> {
    if args.symmetric {
        let key = SymmetricKey::generate()?;
        write_secret(&args.output, key.as_bytes())?;
        println!("Symmetric key written to {}", args.output.display());
        return Ok(());
    }

    let key = PrivateKey::generate()?;
    write_secret(&args.output, &key.to_x963())?;
    println!("Private key written to {}", args.output.display());
    if let Some(public) = &args.public {
        let mut file = create_new_file(public)?;
        file.write_all(key.public_key().as_bytes())?;
        println!("Public key written to {}", public.display());
    }
    debug!(public = ?key.public_key(), "generated signing key");
    Ok(())
}

fn write_secret(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = create_new_file(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    if let Err(err) = file.write_all(bytes).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err.into());
    }
    Ok(())
}
