use std::fmt;
use std::marker::PhantomData;

/// Opaque reference to an object owned by a toolkit session.
///
/// The type parameter records what the object is, so a covariance cannot be
/// passed where an inverse operator is expected. Handles are only meaningful
/// for the session that issued them.
pub struct Handle<K> {
    id: u64,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K> Eq for Handle<K> {}

impl<K: Kind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", K::NAME, self.id)
    }
}

/// Marker for the kinds of toolkit objects.
pub trait Kind {
    const NAME: &'static str;
}

macro_rules! kinds {
    ($($name:ident => $label:literal),* $(,)?) => {
        $(
            #[derive(Debug)]
            pub enum $name {}

            impl Kind for $name {
                const NAME: &'static str = $label;
            }
        )*
    };
}

kinds! {
    Raw => "raw",
    Epochs => "epochs",
    Ica => "ica",
    Covariance => "covariance",
    SourceSpace => "source_space",
    BemModel => "bem_model",
    BemSolution => "bem_solution",
    Forward => "forward",
    InverseOperator => "inverse_operator",
    SourceEstimates => "source_estimates",
    Labels => "labels",
}
