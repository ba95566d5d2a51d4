//! Proxy passwords live in the OS keyring, keyed by host and port; the
//! persisted config documents never contain them.

use keyring::Entry;

const SERVICE_NAME: &str = "proxydesk";

fn entry(host: &str, port: u16) -> Result<Entry, keyring::Error> {
    Entry::new(SERVICE_NAME, &format!("proxy_{host}_{port}"))
}

pub fn store_password(host: &str, port: u16, password: &str) -> Result<(), keyring::Error> {
    entry(host, port)?.set_password(password)
}

pub fn get_password(host: &str, port: u16) -> Result<Option<String>, keyring::Error> {
    match entry(host, port)?.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn delete_password(host: &str, port: u16) -> Result<(), keyring::Error> {
    match entry(host, port)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e),
    }
}
