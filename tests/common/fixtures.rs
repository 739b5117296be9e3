use std::sync::Arc;

use partition_batch::{
    BatchConfig, DynamicEntity, MemoryTableStore, TableBatchClient, TableOperation, TablePool,
    TableStore,
};

use super::recording_store::RecordingStore;

/// A game score keyed by region and player, mapped to a row by the tests
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub region: String,
    pub player: String,
    pub points: i64,
}

impl Score {
    pub fn new(region: &str, player: &str, points: i64) -> Self {
        Self {
            region: region.to_string(),
            player: player.to_string(),
            points,
        }
    }

    pub fn to_entity(&self) -> DynamicEntity {
        DynamicEntity::new(self.region.clone(), self.player.clone())
            .expect("fixture keys are never blank")
            .with_property("points", self.points)
    }
}

/// `per_region` scores in each of `regions` regions, interleaved across regions
pub fn scores(regions: usize, per_region: usize) -> Vec<Score> {
    (0..per_region)
        .flat_map(|player| {
            (0..regions).map(move |region| {
                Score::new(
                    &format!("region-{region:02}"),
                    &format!("player-{player:05}"),
                    (player * 10 + region) as i64,
                )
            })
        })
        .collect()
}

pub fn region_keys(regions: usize) -> Vec<String> {
    (0..regions).map(|r| format!("region-{r:02}")).collect()
}

pub fn test_config() -> BatchConfig {
    BatchConfig::default()
        .with_batch_size(10)
        .with_max_parallelism(4)
        .with_table_pool_size(4)
}

pub fn client_over(
    store: Arc<RecordingStore>,
    config: BatchConfig,
) -> TableBatchClient<RecordingStore> {
    let pool = TablePool::shared(store, config.table_pool_size).expect("valid pool");
    TableBatchClient::new(Arc::new(pool), config).expect("valid config")
}

/// A memory store holding `rows` rows in each listed partition
pub async fn seeded_memory_store(
    table_name: &str,
    partitions: &[&str],
    rows: usize,
    max_page_size: u32,
) -> MemoryTableStore {
    let store = MemoryTableStore::new(table_name).with_max_page_size(max_page_size);
    store.create_if_not_exists().await.expect("create table");
    for partition_key in partitions {
        let row_keys: Vec<usize> = (0..rows).collect();
        for chunk in row_keys.chunks(100) {
            let operations = chunk
                .iter()
                .map(|i| {
                    TableOperation::insert(
                        DynamicEntity::new(*partition_key, format!("row-{i:05}"))
                            .expect("fixture keys are never blank")
                            .with_property("n", *i as i64),
                    )
                })
                .collect();
            store
                .submit_batch(partition_key, operations)
                .await
                .expect("seed batch");
        }
    }
    store
}
