use kukur_core::KukurError;

pub(crate) fn map_sqlite_err(err: rusqlite::Error) -> KukurError {
    KukurError::Transient(err.into())
}
