use redb::TableDefinition;

/// Document records: uuid -> DocumentRecord (msgpack)
pub const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");
