//! Visibility/modifier configuration and the attribute flags derived from it
//!
//! Flag computation is kept as pure functions of the configuration so the
//! full visibility × modifier × nesting table can be tested directly.

use bitflags::bitflags;

use crate::types::TypeKind;

/// Declared accessibility of a type or member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Accessible everywhere
    #[default]
    Public,
    /// Accessible only inside the declaring type
    Private,
    /// Accessible inside the defining unit
    Internal,
    /// Accessible to the declaring type and its subclasses
    Protected,
}

/// Declaration modifier of a type or member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Modifier {
    /// No modifier
    #[default]
    Standard,
    /// Abstract type or member
    Abstract,
    /// Sealed type, or a final override
    Sealed,
    /// Virtual member
    Virtual,
    /// Static type or member
    Static,
    /// Explicit implementation of an interface member
    ExplicitInterfaceImpl,
}

bitflags! {
    /// Flags of a realized type
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Top-level, visible outside the unit
        const PUBLIC = 1 << 0;
        /// Top-level, visible inside the unit only
        const NOT_PUBLIC = 1 << 1;
        /// Nested, public
        const NESTED_PUBLIC = 1 << 2;
        /// Nested, private to the enclosing type
        const NESTED_PRIVATE = 1 << 3;
        /// Nested, visible inside the unit
        const NESTED_ASSEMBLY = 1 << 4;
        /// Nested, visible to subclasses of the enclosing type
        const NESTED_FAMILY = 1 << 5;
        /// Cannot be instantiated
        const ABSTRACT = 1 << 6;
        /// Cannot be derived from
        const SEALED = 1 << 7;
        /// Interface contract
        const INTERFACE = 1 << 8;
        /// Value type (enums)
        const VALUE_TYPE = 1 << 9;
    }
}

bitflags! {
    /// Flags of a method or constructor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u32 {
        /// Public
        const PUBLIC = 1 << 0;
        /// Private
        const PRIVATE = 1 << 1;
        /// Visible inside the unit
        const ASSEMBLY = 1 << 2;
        /// Visible to subclasses
        const FAMILY = 1 << 3;
        /// No receiver
        const STATIC = 1 << 4;
        /// Cannot be overridden further
        const FINAL = 1 << 5;
        /// Dispatched through the vtable
        const VIRTUAL = 1 << 6;
        /// Hidden by name and signature
        const HIDE_BY_SIG = 1 << 7;
        /// Occupies a fresh vtable slot
        const NEW_SLOT = 1 << 8;
        /// No body
        const ABSTRACT = 1 << 9;
        /// Accessor or other specially named method
        const SPECIAL_NAME = 1 << 10;
        /// Constructor
        const RT_SPECIAL_NAME = 1 << 11;
    }
}

bitflags! {
    /// Flags of a field
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u32 {
        /// Public
        const PUBLIC = 1 << 0;
        /// Private
        const PRIVATE = 1 << 1;
        /// Visible inside the unit
        const ASSEMBLY = 1 << 2;
        /// Visible to subclasses
        const FAMILY = 1 << 3;
        /// One value per type
        const STATIC = 1 << 4;
        /// Assignable only during construction
        const INIT_ONLY = 1 << 5;
        /// Compile-time constant
        const LITERAL = 1 << 6;
        /// Carries a default value
        const HAS_DEFAULT = 1 << 7;
    }
}

/// Compute type flags from kind, visibility, modifier and nesting
pub fn type_attributes(
    kind: TypeKind,
    visibility: Visibility,
    modifier: Modifier,
    nested: bool,
) -> TypeAttributes {
    let mut attrs = match (nested, visibility) {
        (false, Visibility::Public) => TypeAttributes::PUBLIC,
        (false, _) => TypeAttributes::NOT_PUBLIC,
        (true, Visibility::Public) => TypeAttributes::NESTED_PUBLIC,
        (true, Visibility::Private) => TypeAttributes::NESTED_PRIVATE,
        (true, Visibility::Internal) => TypeAttributes::NESTED_ASSEMBLY,
        (true, Visibility::Protected) => TypeAttributes::NESTED_FAMILY,
    };
    match kind {
        TypeKind::Interface => attrs |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
        TypeKind::Enum { .. } => attrs |= TypeAttributes::SEALED | TypeAttributes::VALUE_TYPE,
        TypeKind::Class => match modifier {
            Modifier::Abstract => attrs |= TypeAttributes::ABSTRACT,
            Modifier::Sealed => attrs |= TypeAttributes::SEALED,
            Modifier::Static => attrs |= TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            Modifier::Standard | Modifier::Virtual | Modifier::ExplicitInterfaceImpl => {}
        },
    }
    attrs
}

fn method_visibility(visibility: Visibility) -> MethodAttributes {
    match visibility {
        Visibility::Public => MethodAttributes::PUBLIC,
        Visibility::Private => MethodAttributes::PRIVATE,
        Visibility::Internal => MethodAttributes::ASSEMBLY,
        Visibility::Protected => MethodAttributes::FAMILY,
    }
}

/// Compute method flags before override resolution
///
/// Interface members are always abstract and virtual. Explicit interface
/// implementations are private, virtual and final.
pub fn method_attributes(
    owner: TypeKind,
    visibility: Visibility,
    modifier: Modifier,
) -> MethodAttributes {
    let base = MethodAttributes::HIDE_BY_SIG;
    if owner.is_interface() {
        return base
            | method_visibility(visibility)
            | MethodAttributes::ABSTRACT
            | MethodAttributes::VIRTUAL
            | MethodAttributes::NEW_SLOT;
    }
    match modifier {
        Modifier::Standard => base | method_visibility(visibility),
        Modifier::Abstract => {
            base | method_visibility(visibility)
                | MethodAttributes::ABSTRACT
                | MethodAttributes::VIRTUAL
                | MethodAttributes::NEW_SLOT
        }
        Modifier::Virtual => {
            base | method_visibility(visibility) | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT
        }
        Modifier::Sealed => {
            base | method_visibility(visibility)
                | MethodAttributes::VIRTUAL
                | MethodAttributes::FINAL
                | MethodAttributes::NEW_SLOT
        }
        Modifier::Static => base | method_visibility(visibility) | MethodAttributes::STATIC,
        Modifier::ExplicitInterfaceImpl => {
            base | MethodAttributes::PRIVATE
                | MethodAttributes::VIRTUAL
                | MethodAttributes::FINAL
                | MethodAttributes::NEW_SLOT
        }
    }
}

/// Where an override target was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOrigin {
    /// A virtual method on the base type chain
    BaseType,
    /// A method of an implemented interface
    Interface,
}

/// Adjust method flags once an override target is known
///
/// Overriding a base virtual reuses its slot, so `NEW_SLOT` is cleared.
/// An interface-only match gets a new final slot unless the caller asked
/// for the member to stay overridable.
pub fn apply_override(
    attrs: MethodAttributes,
    origin: OverrideOrigin,
    modifier: Modifier,
) -> MethodAttributes {
    match origin {
        OverrideOrigin::BaseType => {
            let mut attrs = (attrs | MethodAttributes::VIRTUAL) - MethodAttributes::NEW_SLOT;
            if modifier == Modifier::Sealed {
                attrs |= MethodAttributes::FINAL;
            }
            attrs
        }
        OverrideOrigin::Interface => {
            let attrs = attrs | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT;
            match modifier {
                Modifier::Virtual | Modifier::Abstract => attrs,
                _ => attrs | MethodAttributes::FINAL,
            }
        }
    }
}

/// Compute constructor flags
pub fn constructor_attributes(visibility: Visibility, is_static: bool) -> MethodAttributes {
    let mut attrs = method_visibility(visibility)
        | MethodAttributes::HIDE_BY_SIG
        | MethodAttributes::SPECIAL_NAME
        | MethodAttributes::RT_SPECIAL_NAME;
    if is_static {
        attrs |= MethodAttributes::STATIC;
    }
    attrs
}

/// Compute field flags; a sealed field is assignable only during construction
pub fn field_attributes(visibility: Visibility, modifier: Modifier) -> FieldAttributes {
    let mut attrs = match visibility {
        Visibility::Public => FieldAttributes::PUBLIC,
        Visibility::Private => FieldAttributes::PRIVATE,
        Visibility::Internal => FieldAttributes::ASSEMBLY,
        Visibility::Protected => FieldAttributes::FAMILY,
    };
    match modifier {
        Modifier::Static => attrs |= FieldAttributes::STATIC,
        Modifier::Sealed => attrs |= FieldAttributes::INIT_ONLY,
        _ => {}
    }
    attrs
}

/// Flags of an enum literal
pub fn literal_attributes() -> FieldAttributes {
    FieldAttributes::PUBLIC
        | FieldAttributes::STATIC
        | FieldAttributes::LITERAL
        | FieldAttributes::HAS_DEFAULT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    const VISIBILITIES: [Visibility; 4] = [
        Visibility::Public,
        Visibility::Private,
        Visibility::Internal,
        Visibility::Protected,
    ];

    const MODIFIERS: [Modifier; 6] = [
        Modifier::Standard,
        Modifier::Abstract,
        Modifier::Sealed,
        Modifier::Virtual,
        Modifier::Static,
        Modifier::ExplicitInterfaceImpl,
    ];

    #[test]
    fn test_type_flag_table() {
        let top = [
            TypeAttributes::PUBLIC,
            TypeAttributes::NOT_PUBLIC,
            TypeAttributes::NOT_PUBLIC,
            TypeAttributes::NOT_PUBLIC,
        ];
        let nested = [
            TypeAttributes::NESTED_PUBLIC,
            TypeAttributes::NESTED_PRIVATE,
            TypeAttributes::NESTED_ASSEMBLY,
            TypeAttributes::NESTED_FAMILY,
        ];
        let modifier_bits = [
            TypeAttributes::empty(),
            TypeAttributes::ABSTRACT,
            TypeAttributes::SEALED,
            TypeAttributes::empty(),
            TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
            TypeAttributes::empty(),
        ];
        for (v, vis) in VISIBILITIES.iter().enumerate() {
            for (m, modifier) in MODIFIERS.iter().enumerate() {
                for is_nested in [false, true] {
                    let vis_bits = if is_nested { nested[v] } else { top[v] };
                    assert_eq!(
                        type_attributes(TypeKind::Class, *vis, *modifier, is_nested),
                        vis_bits | modifier_bits[m],
                        "{:?} {:?} nested={}",
                        vis,
                        modifier,
                        is_nested
                    );
                }
            }
        }
    }

    #[test]
    fn test_interface_and_enum_type_flags() {
        let iface = type_attributes(TypeKind::Interface, Visibility::Public, Modifier::Sealed, false);
        assert_eq!(
            iface,
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT
        );
        let kind = TypeKind::Enum {
            underlying: Primitive::I32,
        };
        let e = type_attributes(kind, Visibility::Internal, Modifier::Standard, true);
        assert_eq!(
            e,
            TypeAttributes::NESTED_ASSEMBLY | TypeAttributes::SEALED | TypeAttributes::VALUE_TYPE
        );
    }

    #[test]
    fn test_method_flag_table() {
        use MethodAttributes as M;
        let vis_bits = [M::PUBLIC, M::PRIVATE, M::ASSEMBLY, M::FAMILY];
        let modifier_bits = [
            M::empty(),
            M::ABSTRACT | M::VIRTUAL | M::NEW_SLOT,
            M::VIRTUAL | M::FINAL | M::NEW_SLOT,
            M::VIRTUAL | M::NEW_SLOT,
            M::STATIC,
            M::VIRTUAL | M::FINAL | M::NEW_SLOT,
        ];
        for (v, vis) in VISIBILITIES.iter().enumerate() {
            for (m, modifier) in MODIFIERS.iter().enumerate() {
                // Explicit implementations are private whatever was asked for
                let visibility = if *modifier == Modifier::ExplicitInterfaceImpl {
                    M::PRIVATE
                } else {
                    vis_bits[v]
                };
                assert_eq!(
                    method_attributes(TypeKind::Class, *vis, *modifier),
                    M::HIDE_BY_SIG | visibility | modifier_bits[m],
                    "{:?} {:?}",
                    vis,
                    modifier
                );
            }
        }
    }

    #[test]
    fn test_field_flag_table() {
        use FieldAttributes as F;
        let vis_bits = [F::PUBLIC, F::PRIVATE, F::ASSEMBLY, F::FAMILY];
        let modifier_bits = [
            F::empty(),
            F::empty(),
            F::INIT_ONLY,
            F::empty(),
            F::STATIC,
            F::empty(),
        ];
        for (v, vis) in VISIBILITIES.iter().enumerate() {
            for (m, modifier) in MODIFIERS.iter().enumerate() {
                assert_eq!(
                    field_attributes(*vis, *modifier),
                    vis_bits[v] | modifier_bits[m],
                    "{:?} {:?}",
                    vis,
                    modifier
                );
            }
        }
    }

    #[test]
    fn test_interface_members_are_abstract_virtual() {
        for modifier in [Modifier::Standard, Modifier::Sealed, Modifier::Virtual] {
            let attrs = method_attributes(TypeKind::Interface, Visibility::Public, modifier);
            assert!(attrs.contains(MethodAttributes::ABSTRACT | MethodAttributes::VIRTUAL));
        }
    }

    #[test]
    fn test_apply_override() {
        use MethodAttributes as M;
        let plain = M::PUBLIC | M::HIDE_BY_SIG;

        let base = apply_override(plain, OverrideOrigin::BaseType, Modifier::Standard);
        assert_eq!(base, plain | M::VIRTUAL);

        let sealed = method_attributes(TypeKind::Class, Visibility::Public, Modifier::Sealed);
        let sealed = apply_override(sealed, OverrideOrigin::BaseType, Modifier::Sealed);
        assert!(sealed.contains(M::FINAL));
        assert!(!sealed.contains(M::NEW_SLOT));

        let iface = apply_override(plain, OverrideOrigin::Interface, Modifier::Standard);
        assert_eq!(iface, plain | M::VIRTUAL | M::NEW_SLOT | M::FINAL);

        let virt = method_attributes(TypeKind::Class, Visibility::Public, Modifier::Virtual);
        let virt = apply_override(virt, OverrideOrigin::Interface, Modifier::Virtual);
        assert!(!virt.contains(M::FINAL));
        assert!(virt.contains(M::VIRTUAL | M::NEW_SLOT));
    }

    #[test]
    fn test_constructor_and_field_flags() {
        let ctor = constructor_attributes(Visibility::Public, false);
        assert!(ctor.contains(MethodAttributes::RT_SPECIAL_NAME | MethodAttributes::SPECIAL_NAME));
        assert!(!ctor.contains(MethodAttributes::STATIC));
        assert!(constructor_attributes(Visibility::Private, true).contains(MethodAttributes::STATIC));

        assert_eq!(
            field_attributes(Visibility::Private, Modifier::Static),
            FieldAttributes::PRIVATE | FieldAttributes::STATIC
        );
        assert_eq!(
            field_attributes(Visibility::Public, Modifier::Sealed),
            FieldAttributes::PUBLIC | FieldAttributes::INIT_ONLY
        );
        assert!(literal_attributes().contains(FieldAttributes::LITERAL));
    }
}
