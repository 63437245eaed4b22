use zeroize::Zeroizing;

/// Supplies the passphrase for symmetrically encrypted session keys.
#[derive(derive_more::Debug)]
pub enum Password {
    Dynamic(#[debug("Box<Fn>")] Box<dyn Fn() -> Zeroizing<Vec<u8>> + Send + Sync>),
    Static(#[debug("***")] Zeroizing<Vec<u8>>),
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::Static(value.into_bytes().into())
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::Static(value.as_bytes().to_vec().into())
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::empty()
    }
}

impl Password {
    pub fn empty() -> Self {
        Self::Static(Vec::new().into())
    }

    /// Wraps a callback that is only invoked once a passphrase is actually needed.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Box::new(move || f().into_bytes().into()))
    }

    pub fn read(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Dynamic(f) => f(),
            Self::Static(s) => s.clone(),
        }
    }
}
