pub use enclose::*;

/// Builds a type member closure, optionally cloning captures first.
///
/// ```ignore
/// TypeDef::new("Counter").member("increment", member!((count) this, args => {
///     count.update(|c| *c += 1);
///     Ok(None)
/// }))
/// ```
#[macro_export]
macro_rules! member {
    (( $($d_tt:tt)* ) $this:ident, $args:ident => $($b:tt)*) => {
        $crate::macros::enclose!(($( $d_tt )*) move |$this: &$crate::Instance, $args: &$crate::Args| -> $crate::Result<$crate::Output> { $($b)* })
    };
    ($this:ident, $args:ident => $($b:tt)*) => {
        move |$this: &$crate::Instance, $args: &$crate::Args| -> $crate::Result<$crate::Output> { $($b)* }
    };
}

/// `bind!(target, source)` binds two-way with the identity template,
/// `bind!(target, source, to_target)` one way, and
/// `bind!(target, source, to_target, to_source)` two way.
#[macro_export]
macro_rules! bind {
    ($target:expr, $source:expr $(,)?) => {
        $crate::bind($target, &$source)
    };
    ($target:expr, $source:expr, $to_target:expr $(,)?) => {
        $crate::bind_with($target, &$source, $crate::Template::one_way($to_target))
    };
    ($target:expr, $source:expr, $to_target:expr, $to_source:expr $(,)?) => {
        $crate::bind_with(
            $target,
            &$source,
            $crate::Template::two_way($to_target, $to_source),
        )
    };
}
