//! `feature` command: metadata of one feature in a b3dm tile.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tilestream::coord::{CrsId, TileAddress};
use tilestream::decode::{B3dmDecoder, ContentDecoder};
use tilestream::extension::ExtensionRegistry;
use tilestream::semantic::{get_info_from_intersect_object, SemanticSource, SemanticTable};

use crate::error::CliError;
use crate::runner::read_file;

#[derive(Debug, Args)]
pub struct FeatureArgs {
    /// Path to a .b3dm file
    pub path: PathBuf,

    /// Feature (batch) id
    pub feature_id: u32,
}

/// A single decoded tile standing alone.
struct SingleTile {
    address: TileAddress,
    table: Option<Arc<SemanticTable>>,
}

impl SemanticSource for SingleTile {
    fn semantic_table(&self, address: &TileAddress) -> Option<Arc<SemanticTable>> {
        (*address == self.address)
            .then(|| self.table.clone())
            .flatten()
    }

    fn structural_parent(&self, _address: &TileAddress) -> Option<TileAddress> {
        None
    }
}

/// Decodes the tile and prints the feature's metadata as JSON.
pub fn run(args: FeatureArgs) -> Result<(), CliError> {
    let bytes = read_file(&args.path)?;
    let address = TileAddress::root(CrsId::Local);
    let decoder = B3dmDecoder::new(Arc::new(ExtensionRegistry::with_builtin()));
    let payload = decoder.decode(&address, &bytes)?;

    let tile = SingleTile {
        address,
        table: payload.semantic_table(),
    };

    match get_info_from_intersect_object(&tile, args.feature_id, &address)? {
        Some(info) => {
            let json = serde_json::to_string_pretty(&info).map_err(|error| CliError::Json {
                path: args.path.clone(),
                error,
            })?;
            println!("{}", json);
        }
        None => println!("{} has no batch table", args.path.display()),
    }

    Ok(())
}
