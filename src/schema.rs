/// Column-name constants and label values for realty-tiers.
/// Single source of truth - also exported to Python when built with the `python` feature.

// ── Aggregation columns ─────────────────────────────────────────────────────
pub mod aggregate {
    pub const UNIT_COUNT: &str = "n_unidades";
    pub const MEDIAN_SUFFIX: &str = "_median";
    pub const MEAN_SUFFIX: &str = "_mean";
    pub const STD_SUFFIX: &str = "_std";
    /// Working columns of the join, never present in its output.
    pub const JOIN_KEY: &str = "__clave_union";
    pub const ROW_INDEX: &str = "__fila";
}

// ── Sales metric columns ────────────────────────────────────────────────────
pub mod metrics {
    pub const VELOCITY: &str = "velocidad_ventas";
    pub const MONTHS_TO_SELLOUT: &str = "meses_para_agotar";
    pub const MONTHS_SINCE_LAUNCH: &str = "meses_desde_inicio";
    pub const TOTAL_TIME_ESTIMATE: &str = "tiempo_total_estimado_meses";
    pub const UNITS_SOLD: &str = "unidades_vendidas";
}

// ── Anomaly columns ─────────────────────────────────────────────────────────
pub mod anomaly {
    pub const IS_ANOMALY: &str = "_es_anomalia";
    pub const REASON: &str = "_razon_anomalia";
}

// ── Engineered feature columns ──────────────────────────────────────────────
pub mod features {
    pub const PRICE_PCT_ZONE: &str = "_precio_m2_percentil_zona";
    pub const PRICE_PCT_STRATUM: &str = "_precio_m2_percentil_estrato";
    pub const SIZE_BUCKET: &str = "_tamano_proyecto";
    pub const LOG_SIZE: &str = "_log_tamano";
    pub const PENETRATION: &str = "_porcentaje_vendido_feat";
    pub const SOLD_AVAILABLE_RATIO: &str = "_ratio_vendidas_disponibles";
    pub const AGE_BUCKET: &str = "_antiguedad_proyecto";
    pub const HISTORICAL_VELOCITY: &str = "_velocidad_historica";
    pub const AREA_BUCKET: &str = "_categoria_area";
    pub const ZONE_STRATUM: &str = "_zona_estrato";
    pub const PRICE_AREA_DENSITY: &str = "_densidad_precio_area";
    pub const AMENITY_COUNT: &str = "_num_amenidades";

    /// Categorical features one-hot encoded for the regression diagnostic.
    pub const CATEGORICAL: [&str; 3] = [SIZE_BUCKET, AGE_BUCKET, AREA_BUCKET];
}

// ── Classification columns ──────────────────────────────────────────────────
pub mod classification {
    pub const SEGMENT: &str = "_segmento";
}

// ── Canonical output columns ────────────────────────────────────────────────
pub mod output {
    pub const CODE: &str = "Codigo_Proyecto";
    pub const NAME: &str = "Proyecto";
    pub const TIER: &str = "Clasificacion";
    pub const SCORE: &str = "Score_Exito";
    pub const METHOD: &str = "Metodo_Clasificacion";
    pub const COMPOSITE_SCORE: &str = "Score_Compuesto";
    pub const COMPOSITE_TIER: &str = "Clasificacion_Compuesta";
    pub const ZONE: &str = "Zona";
    pub const NEIGHBORHOOD: &str = "Barrio";
    pub const STRATUM: &str = "Estrato";
    pub const AVG_PRICE: &str = "Precio_Promedio";
    pub const AVG_AREA: &str = "Area_Promedio";
    pub const VELOCITY: &str = "Velocidad_Ventas";
    pub const UNITS_SOLD: &str = "Unidades_Vendidas";
    pub const UNITS_AVAILABLE: &str = "Unidades_Disponibles";
    pub const PATTERN: &str = "Patron_Ventas";
    pub const MONTHS_TO_SELLOUT: &str = "Meses_Para_Agotar";
    pub const MONTHS_SINCE_LAUNCH: &str = "Meses_Desde_Inicio";
    pub const COORDINATES: &str = "Coordenadas Reales";
    pub const VIS_TYPE: &str = "Tipo_VIS_Principal";
    pub const SELLER: &str = "Vende";

    pub const ALL: [&str; 21] = [
        CODE,
        NAME,
        TIER,
        SCORE,
        METHOD,
        COMPOSITE_SCORE,
        COMPOSITE_TIER,
        ZONE,
        NEIGHBORHOOD,
        STRATUM,
        AVG_PRICE,
        AVG_AREA,
        VELOCITY,
        UNITS_SOLD,
        UNITS_AVAILABLE,
        PATTERN,
        MONTHS_TO_SELLOUT,
        MONTHS_SINCE_LAUNCH,
        COORDINATES,
        VIS_TYPE,
        SELLER,
    ];

    pub fn is_canonical(name: &str) -> bool {
        ALL.contains(&name)
    }
}

// ── Label values ────────────────────────────────────────────────────────────
pub mod labels {
    pub const NOT_AVAILABLE: &str = "N/A";
    pub const COMPOSITE_SUFFIX: &str = "_Compuesto";
}
