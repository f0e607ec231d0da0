use shared::{MenopausalState, ReceptorStatus};

feature_record! {
    /// Clinical and genomic profile submitted to the treatment recommender.
    pub struct TreatmentFeatures {
        age_at_diagnosis: f64 => "Age at Diagnosis",
        neoplasm_histologic_grade: i64 => "Neoplasm Histologic Grade",
        her2_status: ReceptorStatus => "HER2 Status",
        er_status: ReceptorStatus => "ER Status",
        pr_status: ReceptorStatus => "PR Status",
        tumor_size: f64 => "Tumor Size",
        tumor_stage: i64 => "Tumor Stage",
        lymph_nodes_examined_positive: i64 => "Lymph nodes examined positive",
        mutation_count: i64 => "Mutation Count",
        nottingham_prognostic_index: f64 => "Nottingham prognostic index",
        inferred_menopausal_state: MenopausalState => "Inferred Menopausal State",
        brca1: f64 => "BRCA1",
        brca2: f64 => "BRCA2",
        tp53: f64 => "TP53",
        erbb2: f64 => "ERBB2",
        esr1: f64 => "ESR1",
        pgr: f64 => "PGR",
        akt1: f64 => "AKT1",
        pik3ca: f64 => "PIK3CA",
        mki67: f64 => "MKI67",
        cdh1: f64 => "CDH1",
    }
}

feature_record! {
    /// Profile submitted to the survival classifier. Keys are the snake_case
    /// form of the model columns.
    pub struct SurvivalFeatures {
        age_at_diagnosis: f64 => "Age at Diagnosis",
        neoplasm_histologic_grade: i64 => "Neoplasm Histologic Grade",
        her2_status: ReceptorStatus => "HER2 Status",
        er_status: ReceptorStatus => "ER Status",
        pr_status: ReceptorStatus => "PR Status",
        tumor_size: f64 => "Tumor Size",
        tumor_stage: i64 => "Tumor Stage",
        lymph_nodes_examined_positive: i64 => "Lymph nodes examined positive",
        mutation_count: i64 => "Mutation Count",
        nottingham_prognostic_index: f64 => "Nottingham prognostic index",
        inferred_menopausal_state: MenopausalState => "Inferred Menopausal State",
        overall_survival_months: f64 => "Overall Survival (Months)",
        relapse_free_status_months: f64 => "Relapse Free Status (Months)",
        tmb_nonsynonymous: f64 => "TMB (nonsynonymous)",
        brca1: f64 => "BRCA1",
        brca2: f64 => "BRCA2",
        tp53: f64 => "TP53",
        erbb2: f64 => "ERBB2",
        esr1: f64 => "ESR1",
        pgr: f64 => "PGR",
        akt1: f64 => "AKT1",
        pik3ca: f64 => "PIK3CA",
        mki67: f64 => "MKI67",
        cdh1: f64 => "CDH1",
        bcl10: f64 => "BCL10",
        cfh: f64 => "CFH",
        rbm14: f64 => "RBM14",
        taok2: f64 => "TAOK2",
        dusp11: f64 => "DUSP11",
        iscu: f64 => "ISCU",
        marchf6: f64 => "MARCHF6",
        mob3b: f64 => "MOB3B",
        dnajb6: f64 => "DNAJB6",
        atg12: f64 => "ATG12",
    }
}
