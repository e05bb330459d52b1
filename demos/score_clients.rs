use churn_feature_pipeline::*;

const CLIENTS: &str = "\
new_codeclient,gouvernorat,New_DateDerniereConnexion,new_dateresiliationsouhaite,New_Datedebutducontrat,New_DateFinducontrat,Motif resilliation,offre
C100,Tunis,2023-06-10,2023-06-07,2022-06-01,2023-06-01,Trop cher,ADSL 8M
C101,Sfax,2023-06-10,2023-06-20,2022-06-01,2024-06-01,Autres,GPON
C102,Sousse,2023-05-02 09:15:00,2023-04-28 00:00:00,2021-01-01,2023-01-01,Qualité de service,ADSL 4M
C103,Tunis,2023-06-01,2023-07-01,2020-03-01,2023-03-01,Migration vers GPON,ADSL 20M
";

const INVOICES: &str = "\
unique_codesclient,new_numerofacture,Echeance,CreatedOn,New_restepayer
C100,F-1001,2023-01-15,2023-01-01,15
C100,F-1002,2023-02-15,2023-02-01,10
C102,F-1021,2023-01-15,2023-01-20,0
C102,F-1022,2023-02-15,2023-02-25,40.5
C102,F-1023,2023-03-15,2023-03-01,0
C103,F-1031,2023-03-15,2023-03-01,
";

fn main() -> anyhow::Result<()> {
    println!("📊 Churn Feature Pipeline Demonstration");
    println!("═══════════════════════════════════════════════════════════════\n");

    let config = PipelineConfig::default();
    let clients = read_client_batch(CLIENTS.as_bytes(), &config)?;
    let invoices = read_invoice_batch(INVOICES.as_bytes(), &config)?;
    println!("Loaded {} clients and {} invoices\n", clients.len(), invoices.len());

    let pipeline = ChurnPipeline::new(config)?;

    // 1. Training context: fit the encoding and label the batch
    let training = match pipeline.build_training_table(&clients, &invoices)? {
        BatchOutcome::Ready(training) => training,
        BatchOutcome::NoData => {
            println!("⚠️  Nothing to process.");
            return Ok(());
        }
    };

    println!("Governorate codes:");
    for (idx, name) in training.encoding.names().iter().enumerate() {
        println!("  {} → {}", name, idx + 1);
    }
    println!();

    println!("Labeled feature table:");
    print!("{}", training.table.to_csv()?);
    println!();

    for row in &training.table.rows {
        let rules = matching_rules(row);
        if !rules.is_empty() {
            println!("  {} flagged by {:?}", row.client_id, rules);
        }
    }
    println!();

    // 2. Serving context: reuse the encoding with a fitted model
    let reference: Vec<FeatureVector> = training
        .table
        .rows
        .iter()
        .map(FeatureRow::feature_vector)
        .collect::<Result<_>>()?;
    let labels: Vec<u8> = training
        .table
        .rows
        .iter()
        .map(|row| row.resiliation.unwrap_or_default())
        .collect();

    let artifacts = ScoringArtifacts {
        governorate_encoding: training.encoding,
        scaler: StandardScaler::identity(),
        classifier: KNearestNeighbors::new(1, reference, labels)?,
    };

    let scored = match pipeline.score_with_artifacts(&clients, &invoices, &artifacts)? {
        BatchOutcome::Ready(scored) => scored,
        BatchOutcome::NoData => return Ok(()),
    };

    println!("Predictions:");
    for client in &scored.clients {
        println!(
            "  {} ({}) → {}",
            client.record.client_id,
            client.record.governorate.as_deref().unwrap_or("-"),
            client.prediction
        );
    }

    let summary = ScoringSummary::from_batch(&scored);
    println!("\nPrediction counts: {:?}", summary.prediction_counts);
    println!("Churn rate by governorate:");
    for (name, rate) in &summary.churn_rate_by_governorate {
        println!("  {:<10} {:.2}", name, rate);
    }

    Ok(())
}
