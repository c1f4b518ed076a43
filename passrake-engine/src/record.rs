/// One exported user row to audit.
///
/// `hash` carries the stored password value exactly as exported, including
/// any `{bcrypt}` algorithm tag; the verifier strips the tag before
/// comparison. Recovered plaintext travels in the run outcome rather than
/// being written back into the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub hash: String,
    pub hint: Option<String>,
}

impl UserRecord {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            hash: hash.into(),
            hint: None,
        }
    }
}
