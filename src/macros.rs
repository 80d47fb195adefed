/// Build a single `(name, Attribute)` pair, e.g. `attribute!("in_num_col_dims", 2)`.
#[macro_export]
macro_rules! attribute {
    ($name:expr, $value:expr) => {
        (
            String::from($name),
            $crate::attrs::Attribute::from($value),
        )
    };
}

/// Build an `AttributeMap` from `name => value` pairs.
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::attrs::AttributeMap::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        vec![$($crate::attribute!($name, $value)),+]
            .into_iter()
            .collect::<$crate::attrs::AttributeMap>()
    };
}
