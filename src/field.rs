//! Field tokens: typed accessor references standing in for column names.
//!
//! ```rust,ignore
//! struct Person;
//!
//! critq::entity! {
//!     Person {
//!         ID => id in BaseEntity: i64,
//!         NAME => name: String,
//!         BIRTH_DATE => birth_date as "birthDate": NaiveDate [Date],
//!     }
//! }
//!
//! query.eq(Person::NAME, "Ann");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{CriteriaError, CriteriaResult};
use crate::schema::FieldDef;

/// Stable identity of an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessorId {
    pub declaring_type: Cow<'static, str>,
    pub method: Cow<'static, str>,
    pub signature: Cow<'static, str>,
}

impl fmt::Display for AccessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} ({})", self.declaring_type, self.method, self.signature)
    }
}

/// Anything that can stand in for a persisted field in a criteria call.
pub trait Accessor {
    /// Recover the accessor identity.
    fn identify(&self) -> CriteriaResult<AccessorId>;

    /// Entity type the accessor is used against.
    fn entity(&self) -> &str;
}

/// A persisted entity type.
pub trait Entity {
    /// Entity name as written in query text.
    const ENTITY_NAME: &'static str;

    /// Fields this entity exposes, inherited ones included.
    fn fields() -> Vec<FieldDef>;
}

/// Compile-time field token of entity `E` with value type `T`.
pub struct Field<E, T> {
    entity: &'static str,
    declared_in: &'static str,
    method: &'static str,
    signature: &'static str,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Field<E, T> {
    /// A field declared directly on `entity`.
    pub const fn new(entity: &'static str, method: &'static str, signature: &'static str) -> Self {
        Self::inherited(entity, entity, method, signature)
    }

    /// A field `entity` inherits from `declared_in`.
    pub const fn inherited(
        entity: &'static str,
        declared_in: &'static str,
        method: &'static str,
        signature: &'static str,
    ) -> Self {
        Self {
            entity,
            declared_in,
            method,
            signature,
            _marker: PhantomData,
        }
    }

    pub const fn method(&self) -> &'static str {
        self.method
    }
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Field<E, T> {}

impl<E, T> fmt::Debug for Field<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.entity, self.method)
    }
}

impl<E, T> Accessor for Field<E, T> {
    fn identify(&self) -> CriteriaResult<AccessorId> {
        Ok(AccessorId {
            declaring_type: Cow::Borrowed(self.declared_in),
            method: Cow::Borrowed(self.method),
            signature: Cow::Borrowed(self.signature),
        })
    }

    fn entity(&self) -> &str {
        self.entity
    }
}

/// Runtime, string keyed accessor (CLI input, generated code without tokens).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynField {
    entity: String,
    method: String,
}

impl DynField {
    pub fn new(entity: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            method: method.into(),
        }
    }
}

impl Accessor for DynField {
    fn identify(&self) -> CriteriaResult<AccessorId> {
        if self.entity.is_empty() || self.method.is_empty() {
            return Err(CriteriaError::resolution(format!(
                "accessor '{}::{}' carries no identity",
                self.entity, self.method
            )));
        }
        Ok(AccessorId {
            declaring_type: Cow::Owned(self.entity.clone()),
            method: Cow::Owned(self.method.clone()),
            signature: Cow::Borrowed("dyn"),
        })
    }

    fn entity(&self) -> &str {
        &self.entity
    }
}

impl<A: Accessor + ?Sized> Accessor for &A {
    fn identify(&self) -> CriteriaResult<AccessorId> {
        (**self).identify()
    }

    fn entity(&self) -> &str {
        (**self).entity()
    }
}

/// Implement [`Entity`] for a type and generate one field token per field.
///
/// Each entry reads `CONST => method [as "column"] [in Parent]: Type [Temporal]`.
#[macro_export]
macro_rules! entity {
    (
        $entity:ident {
            $(
                $token:ident => $method:ident
                $( as $column:literal )?
                $( in $owner:ident )?
                : $ty:ty
                $( [ $temporal:ident ] )?
            ),* $(,)?
        }
    ) => {
        impl $crate::field::Entity for $entity {
            const ENTITY_NAME: &'static str = stringify!($entity);

            fn fields() -> ::std::vec::Vec<$crate::schema::FieldDef> {
                ::std::vec![
                    $(
                        $crate::schema::FieldDef {
                            declared_in: $crate::entity!(@owner $entity $( $owner )?),
                            method: stringify!($method),
                            field_name: $crate::entity!(@column $method $( $column )?),
                            field_type: stringify!($ty),
                            temporal: $crate::entity!(@temporal $( $temporal )?),
                        }
                    ),*
                ]
            }
        }

        #[allow(dead_code)]
        impl $entity {
            $(
                pub const $token: $crate::field::Field<$entity, $ty> =
                    $crate::field::Field::inherited(
                        stringify!($entity),
                        $crate::entity!(@owner $entity $( $owner )?),
                        stringify!($method),
                        stringify!($ty),
                    );
            )*
        }
    };
    (@owner $entity:ident) => { stringify!($entity) };
    (@owner $entity:ident $owner:ident) => { stringify!($owner) };
    (@column $method:ident) => { stringify!($method) };
    (@column $method:ident $column:literal) => { $column };
    (@temporal) => { ::std::option::Option::None };
    (@temporal $temporal:ident) => {
        ::std::option::Option::Some($crate::schema::TemporalClass::$temporal)
    };
}
