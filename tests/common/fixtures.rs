//! Canned output of the external tools the pipeline drives.

#![allow(dead_code)]

pub const CONDA_INFO: &str = "
     active environment : None
       user config file : /root/.condarc
          conda version : 24.1.2
    conda-build version : not installed
";

pub const MINIFORGE_INSTALL: &str = "PREFIX=/content/miniforge3
Unpacking payload ...
Extracting _libgcc_mutex-0.1-conda_forge.tar.bz2
installation finished.
";

pub const MAMBA_ENV_CREATE: &str = "Preparing transaction: ...working... done
Verifying transaction: ...working... done
Executing transaction: ...working... done
";

pub const QIIME_INFO: &str = "System versions
Python version: 3.8.15
QIIME 2 release: 2024.2
QIIME 2 version: 2024.2.0
q2cli version: 2024.2.0
";

pub const PIP_SHOW_EMPRESS: &str = "Name: empress
Version: 1.2.0
Summary: Fast and scalable phylogenetic tree viewer.
";

pub const PIP_INSTALL_EMPRESS: &str = "Collecting empress
Installing collected packages: empress
Successfully installed empress-1.2.0
";

pub const WGET_404: &str = "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-Linux-x86_64.sh:
2024-03-01 10:00:00 ERROR 404: Not Found.
";
