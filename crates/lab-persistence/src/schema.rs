// Esquema Diesel de las tablas del motor de carriles.
// Tablas: experiments, lanes, pools, libraries, lane_pool_links
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    experiments (id) {
        id -> Text,
        name -> Text,
        workflow_id -> SmallInt,
        status -> SmallInt,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    lanes (id) {
        id -> Text,
        experiment_id -> Text,
        number -> Integer,
        phi_x -> Nullable<Double>,
        avg_fragment_size -> Nullable<Integer>,
        original_qubit_concentration -> Nullable<Double>,
        sequencing_qubit_concentration -> Nullable<Double>,
        total_volume_ul -> Nullable<Double>,
        library_volume_ul -> Nullable<Double>,
        target_molarity -> Nullable<Double>,
    }
}
diesel::table! {
    pools (id) {
        id -> Text,
        name -> Text,
        num_m_reads_requested -> Nullable<Double>,
        experiment_id -> Nullable<Text>,
    }
}
diesel::table! {
    libraries (id) {
        id -> Text,
        name -> Text,
        pool_id -> Nullable<Text>,
        experiment_id -> Nullable<Text>,
    }
}
diesel::table! {
    lane_pool_links (lane_id, pool_id) {
        lane_id -> Text,
        pool_id -> Text,
        experiment_id -> Text,
        lane_num -> Integer,
        num_m_reads -> Nullable<Double>,
        dilution_id -> Nullable<Text>,
    }
}
allow_tables_to_appear_in_same_query!(experiments, lanes, pools, libraries, lane_pool_links);
