/// Column-name constants for the surveillance tables.
/// Single source of truth for every stage and the Python bindings.

// ── Raw surveillance columns ────────────────────────────────────────────────
pub mod raw {
    pub const DEPARTAMENTO: &str = "departamento";
    pub const PROVINCIA: &str = "provincia";
    pub const DISTRITO: &str = "distrito";
    pub const ANO: &str = "ano";
    pub const SEMANA: &str = "semana";
    pub const TIPO_DX: &str = "tipo_dx";
    pub const SEXO: &str = "sexo";
    pub const EDAD: &str = "edad";
    pub const TIPO_EDAD: &str = "tipo_edad";

    pub const ALL: [&str; 9] = [
        DEPARTAMENTO,
        PROVINCIA,
        DISTRITO,
        ANO,
        SEMANA,
        TIPO_DX,
        SEXO,
        EDAD,
        TIPO_EDAD,
    ];

    /// Region hierarchy, normalized to trimmed upper case by the cleaner.
    pub const REGION: [&str; 3] = [DEPARTAMENTO, PROVINCIA, DISTRITO];

    /// Rows missing any of these are dropped.
    pub const REQUIRED: [&str; 3] = [DEPARTAMENTO, SEMANA, ANO];
}

// ── Derived columns ─────────────────────────────────────────────────────────
pub mod derived {
    pub const CASOS: &str = "casos";
    pub const BROTE: &str = "brote";
    pub const CASOS_LAG1: &str = "casos_lag1";
    pub const CASOS_DIFF: &str = "casos_diff";
}

// ── Aggregation key ─────────────────────────────────────────────────────────
pub mod weekly {
    use super::raw;

    /// (year, week, department), in sort priority order.
    pub const KEY: [&str; 3] = [raw::ANO, raw::SEMANA, raw::DEPARTAMENTO];
}

// ── Diagnosis codes ─────────────────────────────────────────────────────────
pub mod diagnosis {
    pub const CONFIRMED: &str = "C";
}

// ── Model inputs ────────────────────────────────────────────────────────────
pub mod model {
    use super::{derived, raw};

    pub const CATEGORICAL: [&str; 5] = [
        raw::DEPARTAMENTO,
        raw::PROVINCIA,
        raw::DISTRITO,
        raw::SEXO,
        raw::TIPO_EDAD,
    ];

    /// Feature order the classifier is fitted with.
    pub const FEATURES: [&str; 10] = [
        raw::EDAD,
        raw::SEXO,
        raw::TIPO_EDAD,
        derived::CASOS_LAG1,
        derived::CASOS_DIFF,
        raw::DEPARTAMENTO,
        raw::PROVINCIA,
        raw::DISTRITO,
        raw::ANO,
        raw::SEMANA,
    ];
}
