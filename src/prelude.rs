/*
Typed column access on polars frames
 */
use polars::prelude::*;

// pull a whole column out as native values
pub trait ColumnValues: Sized {
    fn column_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<Self>>>;
}

macro_rules! impl_column_values {
    ($($t:ty => $accessor:ident),* $(,)?) => {
        $(
            impl ColumnValues for $t {
                fn column_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<Self>>> {
                    let series = df.column(name)?.as_materialized_series();
                    Ok(series.$accessor()?.into_iter().collect())
                }
            }
        )*
    };
}

impl_column_values! {
    f64 => f64,
    u32 => u32,
}
