#![no_main]

mod utils;

use libfuzzer_sys::fuzz_target;
use nodedbg_protocol::wire::FrameReader;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(utils::MAX_INPUT_SIZE)];
    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().build() else {
        return;
    };

    runtime.block_on(async {
        let mut reader = FrameReader::new(data);
        // Stop at the first error; a reader is not reused after a framing failure.
        while let Ok(Some(frame)) = reader.read_frame().await {
            let _ = frame.header("Content-Length");
            let _ = std::str::from_utf8(&frame.body);
        }
    });
});
