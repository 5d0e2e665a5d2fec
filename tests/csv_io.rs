use chrono::NaiveDate;
use realty_tiers::schema::output;
use realty_tiers::{io, validate, Engine};

const UNITS: &str = "\
Codigo Proyecto,Precio,Area,Alcobas
101,\"$ 250,000,000\",62,2
101,\"$ 262,000,000\",64,3
102,310000000,71,3
102,305000000,70,3
103,198000000,48,2
103,201000000,50,2
";

const PROJECTS: &str = "\
Cod Proyecto,Proyecto,Zona,Estrato,Unidades Disponibles,Unidades Totales Proyecto,Ventas Promedio Mes Unidades,Fecha Inicio,Vende
101.0,Alameda,Norte,4,30,80,12,15/01/2023,7788.0
102,Bosque,Norte,4,10,60,18,2022-09-01,Grupo Sur
103,Cerezos,Sur,3,45,100,4,2022-03-10,
";

#[test]
fn csv_inputs_classify_and_write_back() {
    let dir = tempfile::tempdir().unwrap();
    let units_path = dir.path().join("unidades.csv");
    let projects_path = dir.path().join("proyectos.csv");
    std::fs::write(&units_path, UNITS).unwrap();
    std::fs::write(&projects_path, PROJECTS).unwrap();

    let units = io::read_csv_as_strings(&units_path).unwrap();
    let projects = io::read_csv_as_strings(&projects_path).unwrap();
    let run = Engine::default()
        .with_as_of(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .classify(&units, &projects)
        .unwrap();

    assert_eq!(run.table.height(), 3);
    assert_eq!(run.summary.units_matched, 6);
    assert!(validate::check(&run.table).unwrap().is_valid());

    let sellers: Vec<Option<String>> = realty_tiers::frame::string_values(&run.table, output::SELLER).unwrap();
    assert_eq!(sellers[0].as_deref(), Some("7788"));
    assert_eq!(sellers[1].as_deref(), Some("Grupo Sur"));

    let out = dir.path().join("clasificacion.csv");
    let mut table = run.table.clone();
    io::write_table(&mut table, &out).unwrap();
    let back = io::read_csv_as_strings(&out).unwrap();
    assert_eq!(back.height(), 3);
    assert!(back.schema().contains(output::TIER));

    let parquet = dir.path().join("clasificacion.parquet");
    io::write_table(&mut table, &parquet).unwrap();
    assert!(parquet.metadata().unwrap().len() > 0);
}
